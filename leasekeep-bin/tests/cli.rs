#[cfg(test)]
mod cli {
    use assert_cmd::cargo::cargo_bin_cmd;
    use http::StatusCode;
    use predicates::{
        prelude::PredicateBooleanExt,
        str::{contains, is_empty},
    };
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::{error::Error, io::Write, path::PathBuf};
    use tempfile::{NamedTempFile, tempdir};
    use test_utils::{fixtures_path, mock_server, seed_file};

    type Result<T> = std::result::Result<T, Box<dyn Error>>;

    fn seed() -> PathBuf {
        fixtures_path!().join("seed").join("pools.toml")
    }

    /// Run a command against the example seed, from an empty working
    /// directory so no `leasekeep.toml` gets picked up
    macro_rules! leasekeep {
        ($($arg:expr),* $(,)?) => {{
            let workdir = tempdir()?;
            let mut cmd = cargo_bin_cmd!();
            cmd.current_dir(workdir.path())
                .env_clear()
                .arg("--seed")
                .arg(seed())
                $(.arg($arg))*;
            (cmd, workdir)
        }};
    }

    fn json(output: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(output)?)
    }

    #[test]
    fn test_stats_of_all_pools() -> Result<()> {
        let (mut cmd, _workdir) = leasekeep!("stats");
        cmd.assert()
            .success()
            .stdout(contains(
                "[residential] 2/2 available · 3 endpoints · 1 not active · 0 active leases",
            ))
            .stdout(contains("[datacenter] 2/2 available · 2 endpoints"))
            .stderr(contains("Seeded 2 pool(s), 5 endpoint(s) and 1 consumer(s)"));
        Ok(())
    }

    #[test]
    fn test_stats_as_json() -> Result<()> {
        let (mut cmd, _workdir) = leasekeep!("--format", "json", "stats", "residential");
        let output = cmd.assert().success().get_output().stdout.clone();

        let stats = json(&output)?;
        assert_eq!(stats.as_array().map(Vec::len), Some(1));
        assert_eq!(stats[0]["pool_name"], "residential");
        assert_eq!(stats[0]["total"], 3);
        assert_eq!(stats[0]["active"], 2);
        assert_eq!(stats[0]["available"], 2);
        Ok(())
    }

    #[test]
    fn test_stats_of_unknown_pool() -> Result<()> {
        let (mut cmd, _workdir) = leasekeep!("stats", "nope");
        cmd.assert()
            .failure()
            .code(1)
            .stderr(contains("Pool `nope` does not exist"));
        Ok(())
    }

    #[test]
    fn test_acquire_by_country() -> Result<()> {
        let (mut cmd, _workdir) = leasekeep!("acquire", "residential", "--country", "CL");
        cmd.assert()
            .success()
            .stdout(contains("[active] socks5://10.0.0.2:1080"))
            .stdout(contains("pool residential"))
            .stdout(contains("10.0.0.1").not());
        Ok(())
    }

    #[test]
    fn test_acquire_until_exhausted() -> Result<()> {
        // Two active endpoints with room for one lease each
        let (mut cmd, _workdir) = leasekeep!("acquire", "residential", "-n", "3", "--retries", "1");
        cmd.assert()
            .failure()
            .code(2)
            .stdout(contains("socks5://10.0.0.1:1080"))
            .stdout(contains("socks5://10.0.0.2:1080"))
            .stderr(contains("No eligible endpoint left in pool `residential` after 2 lease(s)"));
        Ok(())
    }

    #[test]
    fn test_acquire_round_robin_as_json() -> Result<()> {
        let (mut cmd, _workdir) = leasekeep!(
            "--format",
            "json",
            "acquire",
            "datacenter",
            "--selector",
            "round_robin",
            "--consumer",
            "crawler",
            "--duration",
            "30s",
            "-n",
            "2",
        );
        let output = cmd.assert().success().get_output().stdout.clone();

        let leases = json(&output)?;
        let endpoints: Vec<_> = leases
            .as_array()
            .ok_or("expected a JSON array")?
            .iter()
            .map(|lease| lease["endpoint"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(endpoints.len(), 2);
        assert_ne!(endpoints[0], endpoints[1]);
        assert_eq!(leases[0]["pool_name"], "datacenter");
        assert_eq!(leases[0]["status"], "active");
        Ok(())
    }

    #[test]
    fn test_acquire_from_unknown_pool() -> Result<()> {
        let (mut cmd, _workdir) = leasekeep!("acquire", "nope");
        cmd.assert()
            .failure()
            .code(1)
            .stderr(contains("Pool `nope` does not exist"));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_pool() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK);
        let port = mock_server.address().port();
        let seed = seed_file!("local", "127.0.0.1", [port]);

        // The mock server acts as the proxy, so the target is never resolved
        let mut config = NamedTempFile::new()?;
        writeln!(config, "[health]")?;
        writeln!(config, "target_url = \"http://probe.invalid/ip\"")?;
        writeln!(config, "timeout = \"2s\"")?;

        cargo_bin_cmd!()
            .env_clear()
            .arg("--config")
            .arg(config.path())
            .arg("--seed")
            .arg(seed.path())
            .arg("check")
            .arg("local")
            .assert()
            .success()
            .stdout(contains(format!("[active] http://127.0.0.1:{port} HTTP 200")))
            .stdout(contains("1/1 endpoints healthy"));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_reports_unexpected_status() -> Result<()> {
        let mock_server = mock_server!(StatusCode::BAD_GATEWAY);
        let port = mock_server.address().port();
        let seed = seed_file!("local", "127.0.0.1", [port]);

        let mut config = NamedTempFile::new()?;
        writeln!(config, "format = \"json\"")?;
        writeln!(config, "[health]")?;
        writeln!(config, "target_url = \"http://probe.invalid/ip\"")?;

        let output = cargo_bin_cmd!()
            .env_clear()
            .arg("--config")
            .arg(config.path())
            .arg("--seed")
            .arg(seed.path())
            .arg("check")
            .arg("local")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let results = json(&output)?;
        assert_eq!(results[0]["status"], "inactive");
        assert_eq!(results[0]["status_code"], 502);
        Ok(())
    }

    #[test]
    fn test_seed_from_config_file() -> Result<()> {
        let mut config = NamedTempFile::new()?;
        writeln!(config, "seed = {:?}", seed().display().to_string())?;

        cargo_bin_cmd!()
            .env_clear()
            .arg("--config")
            .arg(config.path())
            .arg("stats")
            .arg("datacenter")
            .assert()
            .success()
            .stdout(contains("[datacenter]"));
        Ok(())
    }

    #[test]
    fn test_without_seed() -> Result<()> {
        let workdir = tempdir()?;
        cargo_bin_cmd!()
            .current_dir(workdir.path())
            .env_clear()
            .arg("stats")
            .assert()
            .success()
            .stdout(is_empty())
            .stderr(contains("No seed file given"));
        Ok(())
    }

    #[test]
    fn test_invalid_seed() {
        cargo_bin_cmd!()
            .env_clear()
            .arg("--seed")
            .arg(fixtures_path!().join("seed").join("invalid-port.toml"))
            .arg("stats")
            .assert()
            .failure()
            .code(1)
            .stderr(contains("Cannot register seed file"));
    }

    #[test]
    fn test_invalid_config() {
        let config = fixtures_path!().join("configs").join("invalid.toml");
        cargo_bin_cmd!()
            .env_clear()
            .arg("--config")
            .arg(config)
            .arg("stats")
            .assert()
            .failure()
            .code(3)
            .stderr(contains("Cannot load configuration file"));
    }

    #[test]
    fn test_missing_config() {
        cargo_bin_cmd!()
            .env_clear()
            .arg("--config")
            .arg("does-not-exist.toml")
            .arg("stats")
            .assert()
            .failure()
            .code(3);
    }

    #[test]
    fn test_invalid_default_config() {
        cargo_bin_cmd!()
            .current_dir(fixtures_path!().join("invalid-default"))
            .env_clear()
            .arg("stats")
            .assert()
            .failure()
            .code(3)
            .stderr(contains("Cannot load default configuration file"));
    }

    #[test]
    fn test_quiet_hides_info() -> Result<()> {
        let (mut cmd, _workdir) = leasekeep!("-q", "stats");
        cmd.assert().success().stderr(is_empty());
        Ok(())
    }
}
