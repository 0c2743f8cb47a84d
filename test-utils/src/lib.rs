//! `test-utils` is used for testing in both `leasekeep-lib` and `leasekeep`.
//! This crate does not depend on `leasekeep-lib`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status when
/// handling a matching request.
///
/// The server also works as an HTTP proxy: requests sent through it with an
/// absolute URI get the same response.
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Get the root path of the project.
#[macro_export]
macro_rules! root_path {
    () => {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .to_path_buf()
    };
}

/// Get the path to the `fixtures` directory.
#[macro_export]
macro_rules! fixtures_path {
    () => {
        $crate::root_path!().join("fixtures")
    };
}

/// Loads a fixture from the `fixtures` directory
#[macro_export]
macro_rules! load_fixture {
    ($filename:expr) => {{
        let path = $crate::fixtures_path!().join($filename);
        std::fs::read_to_string(path).unwrap()
    }};
}

/// Write a seed file with one pool named `$pool` whose endpoints listen on
/// `$host` at the given ports, all active with a capacity of one lease.
/// Returns the `tempfile::NamedTempFile`, which must outlive its use.
#[macro_export]
macro_rules! seed_file {
    ($pool:expr, $host:expr, [$($port:expr),* $(,)?]) => {{
        use std::io::Write;

        let mut contents = format!("[[pools]]\nname = \"{}\"\n", $pool);
        $(
            contents.push_str(&format!(
                "\n[[pools.endpoints]]\nhost = \"{}\"\nport = {}\nmax_concurrency = 1\n",
                $host, $port
            ));
        )*

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }};
}
