//! Host knowledge: which callbacks the host serializes, and what the host
//! API calls found in driver code mean for locking and device state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host function bound to the driver's init entry point.
pub const INIT_HOST_FUNCTION: &str = "probe";

/// Host-level serialization domain, always present in the lock catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostLock {
    /// Per-device lock held around probe/remove and power management.
    Device,
    /// `dev->power.lock` held around runtime power management.
    Power,
    /// Global routing netlink lock.
    Rtnl,
    /// Per-queue transmit lock.
    Tx,
}

impl HostLock {
    pub const ALL: [HostLock; 4] = [
        HostLock::Device,
        HostLock::Power,
        HostLock::Rtnl,
        HostLock::Tx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HostLock::Device => "device",
            HostLock::Power => "power",
            HostLock::Rtnl => "rtnl",
            HostLock::Tx => "tx",
        }
    }

    /// Whether the host holds this lock around every call of `host_fn`.
    pub fn is_held_around(self, host_fn: &str, module: &str) -> bool {
        match self {
            HostLock::Device => has_device_lock(host_fn, module),
            HostLock::Power => has_power_lock(host_fn),
            HostLock::Rtnl => has_rtnl(host_fn),
            HostLock::Tx => has_tx_lock(host_fn),
        }
    }
}

impl fmt::Display for HostLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

const POWER_MANAGEMENT_API: &[&str] = &[
    "prepare",
    "complete",
    "resume",
    "suspend",
    "freeze",
    "poweroff",
    "restore",
    "thaw",
    "runtime_resume",
    "runtime_suspend",
    "runtime_idle",
];

const NFC_DEVICE_LOCKED: &[&str] = &[
    "dev_up",
    "dev_down",
    "dep_link_up",
    "dep_link_down",
    "activate_target",
    "deactivate_target",
    "im_transceive",
    "tm_send",
    "start_poll",
    "stop_poll",
];

const NET_DEVICE_RTNL: &[&str] = &[
    "ndo_init",
    "ndo_uninit",
    "ndo_open",
    "ndo_stop",
    "ndo_start_xmit",
    "ndo_validate_addr",
    "ndo_change_mtu",
    "ndo_get_stats64",
    "ndo_get_stats",
    "ndo_poll_controller",
    "ndo_netpoll_setup",
    "ndo_netpoll_cleanup",
    "ndo_fix_features",
    "ndo_set_features",
    "ndo_set_mac_address",
    "ndo_do_ioctl",
    "ndo_set_rx_mode",
];

const ETHTOOL_RTNL: &[&str] = &[
    "get_settings",
    "set_settings",
    "get_drvinfo",
    "get_regs_len",
    "get_regs",
    "get_wol",
    "set_wol",
    "get_msglevel",
    "set_msglevel",
    "nway_reset",
    "get_link",
    "get_eeprom_len",
    "get_eeprom",
    "set_eeprom",
    "get_coalesce",
    "set_coalesce",
    "get_ringparam",
    "set_ringparam",
    "get_pauseparam",
    "set_pauseparam",
    "self_test",
    "get_strings",
    "set_phys_id",
    "get_ethtool_stats",
    "begin",
    "complete",
    "get_priv_flags",
    "set_priv_flags",
    "get_sset_count",
    "get_rxnfc",
    "set_rxnfc",
    "flash_device",
    "reset",
    "get_rxfh_indir_size",
    "get_rxfh_indir",
    "set_rxfh_indir",
    "get_channels",
    "set_channels",
    "get_dump_flag",
    "get_dump_data",
    "set_dump",
    "get_ts_info",
    "get_module_info",
    "get_module_eeprom",
    "get_eee",
    "set_eee",
];

const NETPOLL_DISABLED: &[&str] = &[
    "ndo_poll_controller",
    "ndo_open",
    "ndo_stop",
    "ndo_validate_addr",
];

const NETWORK_DISABLED: &[&str] = &["resume", "restore", "thaw", "runtime_resume"];

const DISABLES_NETWORK: &[&str] = &[
    "suspend",
    "freeze",
    "poweroff",
    "runtime_suspend",
    "shutdown",
];

const EXIT_FUNCTIONS: &[&str] = &["remove", "disconnect"];

pub fn is_init(host_fn: &str) -> bool {
    host_fn == INIT_HOST_FUNCTION
}

pub fn is_exit(host_fn: &str) -> bool {
    EXIT_FUNCTIONS.contains(&host_fn)
}

pub fn has_device_lock(host_fn: &str, module: &str) -> bool {
    matches!(host_fn, "probe" | "remove" | "shutdown")
        || POWER_MANAGEMENT_API.contains(&host_fn)
        || (module == "nfc_ops" && NFC_DEVICE_LOCKED.contains(&host_fn))
}

pub fn has_power_lock(host_fn: &str) -> bool {
    matches!(host_fn, "runtime_resume" | "runtime_suspend" | "runtime_idle")
}

pub fn has_rtnl(host_fn: &str) -> bool {
    NET_DEVICE_RTNL.contains(&host_fn) || ETHTOOL_RTNL.contains(&host_fn)
}

pub fn has_tx_lock(host_fn: &str) -> bool {
    host_fn == "ndo_start_xmit"
}

pub fn is_power_management_api(host_fn: &str) -> bool {
    POWER_MANAGEMENT_API.contains(&host_fn)
}

pub fn is_network_api(host_fn: &str) -> bool {
    has_rtnl(host_fn) || host_fn == "ndo_tx_timeout"
}

pub fn is_called_with_netpoll_disabled(host_fn: &str) -> bool {
    NETPOLL_DISABLED.contains(&host_fn)
}

pub fn is_called_with_network_disabled(host_fn: &str) -> bool {
    NETWORK_DISABLED.contains(&host_fn)
}

/// Only meaningful for drivers that register a `net_device_ops` module.
pub fn is_going_to_disable_network(host_fn: &str, has_net_device_ops: bool) -> bool {
    has_net_device_ops && DISABLES_NETWORK.contains(&host_fn)
}

/// Serialization among `file_operations` or `block_device_operations`
/// callbacks: anything racing with `release` is excluded.
pub fn is_operations_serialized(module1: &str, fn1: &str, module2: &str, fn2: &str) -> bool {
    let serialized_module = matches!(module1, "file_operations" | "block_device_operations");
    serialized_module && module1 == module2 && (fn1 == "release" || fn2 == "release")
}

// ---------------------------------------------------------------------------
// Host API calls
// ---------------------------------------------------------------------------

/// Meaning of a call into the host API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCall {
    /// Initializes a driver-allocated lock.
    LockInit,
    /// Acquires a driver-allocated lock.
    Acquire,
    /// Releases a driver-allocated lock.
    Release,
    /// Explicitly acquires a host lock.
    HostAcquire(HostLock),
    /// Explicitly releases a host lock.
    HostRelease(HostLock),
    /// Implies the host lock is held from here on, without a matching release.
    ImpliesHeld(HostLock),
    /// `register_netdev` (`true`) or `unregister_netdev` (`false`).
    Registration(bool),
    /// Stops the network data path.
    DisableNetwork,
    /// Restarts the network data path.
    EnableNetwork,
    /// Any other host routine the analysis never descends into.
    Opaque,
}

impl HostCall {
    pub fn classify(callee: &str) -> Option<HostCall> {
        let call = match callee {
            "mutex_init" | "spin_lock_init" => HostCall::LockInit,
            "mutex_lock" | "mutex_lock_interruptible" | "spin_lock" | "spin_lock_irqsave"
            | "spin_lock_bh" => HostCall::Acquire,
            "mutex_unlock" | "spin_unlock" | "spin_unlock_irqrestore" | "spin_unlock_bh" => {
                HostCall::Release
            }
            "rtnl_lock" => HostCall::HostAcquire(HostLock::Rtnl),
            "rtnl_unlock" => HostCall::HostRelease(HostLock::Rtnl),
            "netif_tx_lock" => HostCall::HostAcquire(HostLock::Tx),
            "netif_tx_unlock" | "netif_wake_queue" | "netif_start_queue" => {
                HostCall::HostRelease(HostLock::Tx)
            }
            "device_lock" => HostCall::HostAcquire(HostLock::Device),
            "device_unlock" => HostCall::HostRelease(HostLock::Device),
            "pm_runtime_get_sync" | "pm_runtime_get_noresume" => {
                HostCall::HostAcquire(HostLock::Power)
            }
            "pm_runtime_put_sync" | "pm_runtime_put_noidle" => {
                HostCall::HostRelease(HostLock::Power)
            }
            "ASSERT_RTNL" => HostCall::ImpliesHeld(HostLock::Rtnl),
            "netif_stop_queue" => HostCall::ImpliesHeld(HostLock::Tx),
            "register_netdev" => HostCall::Registration(true),
            "unregister_netdev" => HostCall::Registration(false),
            "netif_device_detach" => HostCall::DisableNetwork,
            "netif_device_attach" => HostCall::EnableNetwork,
            _ if is_opaque_routine(callee) => HostCall::Opaque,
            _ => return None,
        };
        Some(call)
    }

    /// The host lock this call manipulates, if any.
    pub fn host_lock(self) -> Option<HostLock> {
        match self {
            HostCall::HostAcquire(l) | HostCall::HostRelease(l) | HostCall::ImpliesHeld(l) => {
                Some(l)
            }
            _ => None,
        }
    }

    pub fn is_lock_operation(self) -> bool {
        matches!(
            self,
            HostCall::Acquire
                | HostCall::Release
                | HostCall::HostAcquire(_)
                | HostCall::HostRelease(_)
                | HostCall::ImpliesHeld(_)
        )
    }
}

fn is_opaque_routine(callee: &str) -> bool {
    const OPAQUE: &[&str] = &[
        "$malloc",
        "$alloc",
        "$free",
        "$memcpy",
        "$memset",
        "kmalloc",
        "kzalloc",
        "kfree",
        "memcpy",
        "memset",
        "copy_from_user",
        "copy_to_user",
        "alloc_etherdev",
        "free_netdev",
        "netdev_priv",
    ];
    OPAQUE.contains(&callee)
        || callee.starts_with("__SMACK")
        || callee.starts_with("boogie_si_record")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ====== Serialization table tests ======

    #[test]
    fn probe_is_init_and_device_locked() {
        assert!(is_init("probe"));
        assert!(has_device_lock("probe", "pci_driver"));
        assert!(!is_exit("probe"));
    }

    #[test]
    fn nfc_callbacks_need_nfc_module() {
        assert!(has_device_lock("dev_up", "nfc_ops"));
        assert!(!has_device_lock("dev_up", "net_device_ops"));
    }

    #[test]
    fn rtnl_covers_ndo_and_ethtool() {
        assert!(has_rtnl("ndo_open"));
        assert!(has_rtnl("get_drvinfo"));
        assert!(!has_rtnl("ndo_tx_timeout"));
        assert!(is_network_api("ndo_tx_timeout"));
    }

    #[test]
    fn host_lock_dispatch_matches_tables() {
        assert!(HostLock::Tx.is_held_around("ndo_start_xmit", "net_device_ops"));
        assert!(HostLock::Power.is_held_around("runtime_idle", "dev_pm_ops"));
        assert!(!HostLock::Power.is_held_around("suspend", "dev_pm_ops"));
    }

    #[test]
    fn disabling_network_requires_net_module() {
        assert!(is_going_to_disable_network("suspend", true));
        assert!(!is_going_to_disable_network("suspend", false));
        assert!(is_called_with_network_disabled("resume"));
    }

    #[test]
    fn release_serializes_file_operations() {
        assert!(is_operations_serialized(
            "file_operations",
            "release",
            "file_operations",
            "read"
        ));
        assert!(!is_operations_serialized(
            "file_operations",
            "open",
            "file_operations",
            "read"
        ));
        assert!(!is_operations_serialized(
            "file_operations",
            "release",
            "block_device_operations",
            "open"
        ));
    }

    // ====== HostCall tests ======

    #[test]
    fn classify_lock_calls() {
        assert_eq!(HostCall::classify("mutex_init"), Some(HostCall::LockInit));
        assert_eq!(HostCall::classify("spin_lock_irqsave"), Some(HostCall::Acquire));
        assert_eq!(HostCall::classify("mutex_unlock"), Some(HostCall::Release));
        assert_eq!(
            HostCall::classify("pm_runtime_get_sync"),
            Some(HostCall::HostAcquire(HostLock::Power))
        );
        assert_eq!(
            HostCall::classify("ASSERT_RTNL"),
            Some(HostCall::ImpliesHeld(HostLock::Rtnl))
        );
    }

    #[test]
    fn classify_other_calls() {
        assert_eq!(
            HostCall::classify("unregister_netdev"),
            Some(HostCall::Registration(false))
        );
        assert_eq!(HostCall::classify("kzalloc"), Some(HostCall::Opaque));
        assert_eq!(HostCall::classify("__SMACK_code"), Some(HostCall::Opaque));
        assert_eq!(HostCall::classify("my_helper"), None);
    }

    #[test]
    fn lock_operation_predicate() {
        assert!(HostCall::Acquire.is_lock_operation());
        assert!(HostCall::ImpliesHeld(HostLock::Tx).is_lock_operation());
        assert!(!HostCall::LockInit.is_lock_operation());
        assert_eq!(HostCall::HostRelease(HostLock::Tx).host_lock(), Some(HostLock::Tx));
    }
}
