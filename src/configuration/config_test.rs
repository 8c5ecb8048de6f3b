use anyhow::Result;

use super::Config;
use crate::application::cli;

#[test]
fn it_serializes_to_valid_toml() {
    let res = Config::serialize_default(cli::build());
    let doc = res.parse::<toml_edit::Document>();
    assert!(doc.is_ok());

    let backend = res
        .split("\n\n")
        .find(|e| return e.contains("remote-backend ="))
        .unwrap_or_default();
    insta::assert_snapshot!(backend, @r###"
    # Remote collection backend. Use none to keep everything local. [possible values: http, none]
    remote-backend = "http"
    "###);

    assert!(res.contains("remote-timeout = 5000"));
    assert!(res.contains("# remote-token = \"\""));
    assert!(!res.contains("config-file"));
}

#[tokio::test]
async fn it_loads_config_from_file() -> Result<()> {
    let matches = cli::build().try_get_matches_from(vec![
        "canvas",
        "-c",
        "./config.example.toml",
        "--remote-timeout",
        "750",
    ])?;
    Config::load(cli::build(), vec![&matches]).await?;
    return Ok(());
}

#[tokio::test]
async fn it_fails_to_loads_config_from_file() -> Result<()> {
    let matches =
        cli::build().try_get_matches_from(vec!["canvas", "-c", "./test/bad-config.toml"])?;
    let res = Config::load(cli::build(), vec![&matches]).await;
    assert!(res.is_err());
    assert!(res.unwrap_err().to_string().contains("carrier-pigeon"));
    return Ok(());
}
