//! CLI routing integration tests.
//!
//! These tests drive the command dispatcher the same way the `chatsapp`
//! binary does, against a temporary config file.

use chatsapp_cli::{run, Cli};
use chatsapp_core::config::Config;
use clap::Parser;
use tempfile::TempDir;

fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

#[tokio::test]
async fn test_version() {
    run(cli(&["chatsapp", "version"])).await.unwrap();
}

#[tokio::test]
async fn test_config_init_show_validate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chatsapp.json5");
    let path_arg = path.to_str().unwrap();

    run(cli(&["chatsapp", "--config", path_arg, "config", "init"]))
        .await
        .unwrap();
    assert_eq!(Config::load(&path).unwrap(), Config::default());

    run(cli(&["chatsapp", "--config", path_arg, "config", "show"]))
        .await
        .unwrap();
    run(cli(&["chatsapp", "--config", path_arg, "config", "validate"]))
        .await
        .unwrap();
    run(cli(&["chatsapp", "--config", path_arg, "config", "path"]))
        .await
        .unwrap();

    // A second init without --force must not clobber the file.
    assert!(run(cli(&["chatsapp", "--config", path_arg, "config", "init"]))
        .await
        .is_err());
}

#[tokio::test]
async fn test_validate_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json5");

    let result = run(cli(&[
        "chatsapp",
        "--config",
        path.to_str().unwrap(),
        "config",
        "validate",
    ]))
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_gateway_run_rejects_bad_flags() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json5");
    let path_arg = path.to_str().unwrap();

    let result = run(cli(&[
        "chatsapp", "--config", path_arg, "gateway", "run", "--bind", "everywhere",
    ]))
    .await;
    assert!(result.unwrap_err().to_string().contains("Invalid bind mode"));

    let result = run(cli(&[
        "chatsapp", "--config", path_arg, "gateway", "run", "--backend", "rest",
    ]))
    .await;
    assert!(result.unwrap_err().to_string().contains("Unknown backend"));
}

#[test]
fn test_unknown_subcommand() {
    assert!(Cli::try_parse_from(["chatsapp", "doctor"]).is_err());
    assert!(Cli::try_parse_from(["chatsapp", "config", "get", "x"]).is_err());
}
