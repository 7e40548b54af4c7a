use cdf_build::cli::Args;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

fn make_args(args: &[&str]) -> Vec<OsString> {
    let mut res = vec![OsString::from("cdf-build")];
    res.extend(args.iter().map(OsString::from));
    res
}

#[test]
fn test_default_args() {
    let parsed = Args::try_parse_from(make_args(&[])).unwrap();

    assert_eq!(parsed.organization_dir, PathBuf::from("."));
    assert_eq!(parsed.build_dir, PathBuf::from("build"));
    assert_eq!(parsed.env, "dev");
    assert!(!parsed.no_clean);
    assert!(!parsed.verbose);
    assert!(!parsed.exit_non_zero_on_warning);
}

#[test]
fn test_all_flags() {
    let args = make_args(&[
        "./org",
        "--build-dir",
        "./out",
        "--env",
        "prod",
        "--no-clean",
        "--verbose",
        "--exit-non-zero-on-warning",
    ]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.organization_dir, PathBuf::from("./org"));
    assert_eq!(parsed.build_dir, PathBuf::from("./out"));
    assert_eq!(parsed.env, "prod");
    assert!(parsed.no_clean);
    assert!(parsed.verbose);
    assert!(parsed.exit_non_zero_on_warning);
}

#[test]
fn test_short_flags() {
    let parsed = Args::try_parse_from(make_args(&["-v", "-b", "out", "-e", "staging"])).unwrap();

    assert!(parsed.verbose);
    assert_eq!(parsed.build_dir, PathBuf::from("out"));
    assert_eq!(parsed.env, "staging");
}

#[test]
fn test_too_many_args() {
    assert!(Args::try_parse_from(make_args(&["./org", "extra"])).is_err());
}
