//! End-to-end driver runs on a small two-entry-point driver.
//!
//! The verifier is stood in for by `/bin/sh` scripts that answer the JSON
//! protocol with fixed verdicts.

#![cfg(unix)]

use std::path::{Path, PathBuf};

use lockwatch_analysis::EntryPointPair;
use lockwatch_driver::{DriverConfig, ErrorReport, Outcome, PairVerdict, parallel, run};
use lockwatch_ir::{
    AttrValue, Attribute, Attributes, Block, Cmd, Expr, Lhs, Procedure, Program, Transfer, Type,
    Variable,
};
use lockwatch_verifier::{ProcessBackend, VerifierConfig};

// ---- Helpers ----

const REGION: &str = "$M.0";

const METADATA: &str = "<pci_driver>\nprobe::drv_probe\n</>\n<file_operations>\nopen::ep_open\nflush::ep_close\n</>\n";

fn sourceloc(line: i128) -> Cmd {
    Cmd::assume_with(
        Attributes::new().with(Attribute {
            key: "sourceloc".into(),
            values: vec![
                AttrValue::Str("drv.c".into()),
                AttrValue::Expr(Expr::int(line)),
                AttrValue::Expr(Expr::int(5)),
            ],
        }),
        Expr::bool(true),
    )
}

fn entry(name: &str, cmds: Vec<Cmd>) -> Procedure {
    let mut proc = Procedure::new(name);
    proc.params.push(Variable::new("dev", Type::Int));
    proc.blocks = vec![Block::new("bb0", cmds, Transfer::Return)];
    proc
}

fn writer(name: &str, line: i128) -> Procedure {
    entry(
        name,
        vec![
            sourceloc(line),
            Cmd::assign(Lhs::map(REGION, Expr::ident("dev")), Expr::int(line)),
        ],
    )
}

fn make_program() -> Program {
    let mut program = Program::new();
    program.add_global(Variable::new(REGION, Type::map(Type::Int, Type::Int)));
    let mut init = Procedure::new("mutex_init");
    init.params.push(Variable::new("p0", Type::Int));
    program.add_procedure(init);
    program.add_procedure(entry(
        "drv_probe",
        vec![Cmd::call("mutex_init", vec![Expr::add(Expr::ident("dev"), Expr::int(8))])],
    ));
    program.add_procedure(writer("ep_open", 10));
    program.add_procedure(writer("ep_close", 20));
    program
}

/// Write program and metadata into `dir` and return a config for them.
fn make_config(dir: &Path) -> DriverConfig {
    let program_path = dir.join("drv.json");
    let metadata_path = dir.join("drv.info");
    std::fs::write(&program_path, make_program().to_json().unwrap()).unwrap();
    std::fs::write(&metadata_path, METADATA).unwrap();
    let mut config = DriverConfig::new(program_path, metadata_path);
    config.jobs = 2;
    config
}

/// Shell stand-in answering refutation queries with `refuted` and
/// verification queries with `verdict`.
fn shell_backend(verdict: &str) -> ProcessBackend {
    let script = format!(
        "cat > /dev/null; case \"$*\" in *--refute-candidates*) echo '{{\"refuted\": []}}';; *) echo '{verdict}';; esac"
    );
    let config = VerifierConfig::new(PathBuf::from("/bin/sh")).with_extra_args(vec![
        "-c".to_string(),
        script,
        "lockwatch-verify".to_string(),
    ]);
    ProcessBackend::new(config)
}

const RACE_VERDICT: &str = r#"{"outcome": "disproved", "counterexample": {"failure": {"kind": "assert", "attributes": {"race_checking": "", "resource": "$M.0", "access": "write"}}, "procedure": "check$ep_open$ep_close", "states": [{"name": "ep_open$1_header_state"}, {"name": "access_state_0"}, {"name": "access_state_1"}]}}"#;

// ---- Tests ----

#[test]
fn pairs_follow_pairing_rules() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(dir.path());
    let analysis = run::load_analysis(&config).unwrap();
    let pairs = run::select_pairs(&analysis, &config).unwrap();
    let cross: Vec<&EntryPointPair> = pairs.iter().filter(|p| !p.is_self_pair()).collect();
    assert_eq!(cross, vec![&EntryPointPair::new("ep_open", "ep_close")]);
    assert!(pairs.iter().all(|p| !p.contains("drv_probe")));
}

#[test]
fn instrument_writes_one_file_per_pair() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = make_config(dir.path());
    let out = dir.path().join("out");
    config.output_dir = Some(out.clone());
    let expected = {
        let analysis = run::load_analysis(&config).unwrap();
        run::select_pairs(&analysis, &config).unwrap().len()
    };
    assert_eq!(lockwatch_driver::instrument(&config).unwrap(), Outcome::Done);

    let mut files: Vec<String> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files.len(), expected);
    assert!(files.contains(&"check_ep_open_ep_close.bpl".to_string()));
    let text = std::fs::read_to_string(out.join("check_ep_open_ep_close.bpl")).unwrap();
    assert!(text.contains("procedure {:entry_pair} check$ep_open$ep_close"));
    assert!(text.contains("race_checking"));
}

#[test]
fn explicit_pair_restricts_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = make_config(dir.path());
    config.pair = Some(("ep_open".into(), "ep_close".into()));
    let analysis = run::load_analysis(&config).unwrap();
    let pairs = run::select_pairs(&analysis, &config).unwrap();
    assert_eq!(pairs.len(), 1);

    config.pair = Some(("ep_open".into(), "nope".into()));
    let err = run::select_pairs(&analysis, &config).unwrap_err();
    assert_eq!(err.outcome(), Outcome::ParsingError);
}

#[test]
fn proved_pairs_finish_done() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(dir.path());
    let analysis = run::load_analysis(&config).unwrap();
    let pairs = run::select_pairs(&analysis, &config).unwrap();
    let backend = shell_backend(r#"{"outcome": "proved"}"#);
    let outcomes = parallel::check_pairs_parallel(&analysis, &pairs, &backend, 2, 8).unwrap();
    assert_eq!(outcomes.len(), pairs.len());
    assert!(outcomes.iter().all(|o| o.verdict == PairVerdict::Proved));
    let stats = lockwatch_driver::RunStatistics::from_outcomes(&outcomes);
    assert_eq!(stats.outcome(), Outcome::Done);
}

#[test]
fn race_counterexample_is_interpreted() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(dir.path());
    let analysis = run::load_analysis(&config).unwrap();
    let pair = analysis.explicit_pair("ep_open", "ep_close").unwrap();
    let outcome = run::check_pair(&analysis, &pair, &shell_backend(RACE_VERDICT), 8).unwrap();

    let reports = outcome.verdict.reports();
    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0], ErrorReport::Race { .. }));
    assert_eq!(
        reports[0].render(),
        vec![
            "drv.c: error: potential write-write race:",
            "write by entry point ep_open, drv.c:10:5",
            "write by entry point ep_close, drv.c:20:5",
        ]
    );
}

#[test]
fn inconclusive_pairs_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(dir.path());
    let analysis = run::load_analysis(&config).unwrap();
    let pairs = run::select_pairs(&analysis, &config).unwrap();
    let backend = shell_backend(r#"{"outcome": "inconclusive", "reason": "timeout"}"#);
    let outcomes = parallel::check_pairs_parallel(&analysis, &pairs, &backend, 1, 8).unwrap();
    assert!(outcomes
        .iter()
        .all(|o| o.verdict == PairVerdict::Inconclusive("timeout".into())));
}

#[test]
fn missing_program_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = make_config(dir.path());
    config.program_path = dir.path().join("missing.json");
    let err = run::load_analysis(&config).unwrap_err();
    assert_eq!(err.outcome(), Outcome::FatalError);
}

#[test]
fn malformed_program_is_parsing_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(dir.path());
    std::fs::write(&config.program_path, "{ not json").unwrap();
    let err = run::load_analysis(&config).unwrap_err();
    assert_eq!(err.outcome(), Outcome::ParsingError);
}
