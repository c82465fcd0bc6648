//! Property tests: address resolution, lock identity and pair enumeration.

use std::collections::BTreeSet;

use lockwatch_analysis::lock::Lock;
use lockwatch_analysis::resolver::{Resolution, Resolver, RootAddress, Site};
use lockwatch_analysis::{DriverMetadata, DriverModel, EntryPointPair, can_be_paired, enumerate_pairs};
use lockwatch_ir::{Block, Cmd, Expr, Lhs, Procedure, Program, Transfer, Type, Variable};
use proptest::prelude::*;

// ---- Helpers ----

const HOST_FUNCTIONS: &[&str] = &[
    "open",
    "release",
    "read",
    "write",
    "ndo_open",
    "ndo_stop",
    "ndo_start_xmit",
    "ndo_tx_timeout",
    "suspend",
    "resume",
    "runtime_suspend",
    "get_drvinfo",
];

fn make_proc(name: &str, blocks: Vec<Block>) -> Procedure {
    let mut proc = Procedure::new(name);
    proc.params.push(Variable::new("b", Type::Int));
    proc.locals = (0..4)
        .map(|i| Variable::new(format!("p{i}"), Type::Int))
        .collect();
    proc.blocks = blocks;
    proc
}

fn make_model(bindings: &[(usize, usize)]) -> DriverModel {
    let mut program = Program::new();
    let mut info = String::new();
    for (module_idx, module) in ["file_operations", "net_device_ops", "dev_pm_ops"].iter().enumerate() {
        info.push_str(&format!("<{module}>\n"));
        for (i, (m, host)) in bindings.iter().enumerate() {
            if *m % 3 != module_idx {
                continue;
            }
            let proc = format!("ep{i}");
            let mut p = Procedure::new(&proc);
            p.blocks = vec![Block::new("bb0", vec![], Transfer::Return)];
            program.add_procedure(p);
            info.push_str(&format!("{}::{proc}\n", HOST_FUNCTIONS[*host % HOST_FUNCTIONS.len()]));
        }
        info.push_str("</>\n");
    }
    let metadata = DriverMetadata::parse_info(&info).unwrap();
    DriverModel::build(&program, &metadata).unwrap()
}

fn base_name() -> impl Strategy<Value = String> {
    prop_oneof![Just("b".to_string()), Just("dev".to_string()), Just("priv".to_string())]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // ====== Resolution ======

    #[test]
    fn resolving_a_root_is_idempotent(offset in -4096i128..4096) {
        let proc = make_proc("f", vec![Block::new("bb0", vec![], Transfer::Return)]);
        let program = Program::new();
        let resolver = Resolver::new(&program, 64);
        let expr = RootAddress::new(Expr::ident("b"), offset).to_expr();
        let resolved = resolver.resolve(&proc, &Site::new("bb0", 0), &expr);
        prop_assert!(resolved.is_resolved());
        prop_assert_eq!(resolved.to_expr(), expr.clone());
        let again = resolver.resolve(&proc, &Site::new("bb0", 0), &resolved.to_expr());
        prop_assert_eq!(again, resolved);
    }

    #[test]
    fn resolution_terminates_on_cycles(
        steps in proptest::collection::vec((0usize..4, 0usize..4, -8i128..8), 1..12),
        query in 0usize..4,
    ) {
        let cmds: Vec<Cmd> = steps
            .iter()
            .map(|(dst, src, k)| {
                Cmd::assign(
                    Lhs::var(format!("p{dst}")),
                    Expr::add(Expr::ident(format!("p{src}")), Expr::int(*k)),
                )
            })
            .collect();
        let len = cmds.len();
        let proc = make_proc(
            "f",
            vec![
                Block::new("bb0", vec![], Transfer::Goto(vec!["head".into()])),
                Block::new("head", cmds, Transfer::Goto(vec!["head".into(), "exit".into()])),
                Block::new("exit", vec![], Transfer::Return),
            ],
        );
        let program = Program::new();
        let resolver = Resolver::new(&program, 64);
        let expr = Expr::ident(format!("p{query}"));
        match resolver.resolve(&proc, &Site::new("head", len), &expr) {
            Resolution::Unresolved(original) => prop_assert_eq!(original, expr),
            Resolution::Resolved(root) => prop_assert!(root.base.as_ident().is_some()),
        }
    }

    // ====== Lock identity ======

    #[test]
    fn lock_equality_is_an_equivalence(
        a in (base_name(), -64i128..64),
        b in (base_name(), -64i128..64),
        c in (base_name(), -64i128..64),
    ) {
        let lock = |(base, off): &(String, i128)| Lock::dynamic(0, RootAddress::new(Expr::ident(base), *off));
        let (x, y, z) = (lock(&a), lock(&b), lock(&c));
        prop_assert_eq!(&x, &x);
        prop_assert_eq!(x == y, y == x);
        if x == y && y == z {
            prop_assert_eq!(&x, &z);
        }
    }

    // ====== Pairing ======

    #[test]
    fn pairing_is_symmetric(bindings in proptest::collection::vec((0usize..3, 0usize..12), 1..8)) {
        let model = make_model(&bindings);
        for a in model.entry_points() {
            for b in model.entry_points() {
                prop_assert_eq!(can_be_paired(a, b), can_be_paired(b, a));
            }
        }
    }

    #[test]
    fn every_pairable_combination_appears_once(
        bindings in proptest::collection::vec((0usize..3, 0usize..12), 1..8),
    ) {
        let model = make_model(&bindings);
        let pairs = enumerate_pairs(&model);
        let distinct: BTreeSet<(String, String)> = pairs
            .iter()
            .map(|p| {
                let mut names = [p.first.clone(), p.second.clone()];
                names.sort();
                (names[0].clone(), names[1].clone())
            })
            .collect();
        prop_assert_eq!(distinct.len(), pairs.len());

        let eps = model.entry_points();
        for (i, a) in eps.iter().enumerate() {
            for b in &eps[i..] {
                let listed = pairs.contains(&EntryPointPair::new(&a.name, &b.name));
                prop_assert_eq!(listed, can_be_paired(a, b));
                if listed {
                    prop_assert!(a.host_locks.is_disjoint(&b.host_locks));
                }
            }
        }
    }
}
