use clap::{ArgAction, Parser};
use std::io::{self, Write};
use std::time::Duration;
use tasmota_fingerprint::{
    fingerprint_source, AcquireOptions, Error, Result, Source, X509KeyDecoder,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Compute the TLS fingerprint Tasmota shows for its MQTT broker
#[derive(Parser)]
#[clap(
    author,
    version,
    about = "Print the Tasmota-compatible fingerprint of an RSA TLS certificate, fetched from a server or read from a file.",
    after_help = "EXAMPLES:\n\
    \n  Fingerprint the certificate of an MQTT broker:\n    tasmota-fingerprint mqtt.example.com:8883\n\
    \n  Fingerprint a local certificate file:\n    tasmota-fingerprint /etc/mosquitto/certs/server.crt\n\
    \n  Read a certificate from stdin:\n    openssl s_client -connect broker:8883 </dev/null | tasmota-fingerprint -\n\
    \nNOTES:\n\
    - Certificates are NOT verified. Compare the printed value with the one on the Tasmota console.\n\
    - Only RSA certificates can be fingerprinted. A TLS handshake failure usually means the server has none.\n\
    - An empty port ('host:') means 8883.\n\
    - Exit codes: 1 usage, 2 connection/handshake, 3 file, 4 key decoding.\n"
)]
struct Cli {
    /// Certificate source: host:port, a PEM/DER file, or '-' for stdin
    #[clap(
        value_name = "SOURCE",
        help = "Certificate source: host:port, a PEM/DER file, or '-' for stdin"
    )]
    source: String,

    /// Connect and handshake timeout in seconds (default: none)
    #[clap(
        short,
        long,
        env = "TASMOTA_FP_TIMEOUT",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Connect and handshake timeout in seconds (default: none)"
    )]
    timeout: Option<u64>,

    /// Print only the fingerprint, without the firmware label
    #[clap(long, help = "Print only the fingerprint, without the firmware label")]
    no_label: bool,

    /// Log progress to stderr (-v debug, -vv trace)
    #[clap(short, long, action = ArgAction::Count, help = "Log progress to stderr (-v debug, -vv trace)")]
    verbose: u8,
}

impl Cli {
    fn acquire_options(&self) -> AcquireOptions {
        AcquireOptions {
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "warn,tasmota_fingerprint=debug",
        _ => "debug,tasmota_fingerprint=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let source = Source::parse(&cli.source)?;
    info!("Fingerprinting {}", source);

    let fingerprint = fingerprint_source(&source, &cli.acquire_options(), &X509KeyDecoder)?;

    let line = if cli.no_label {
        fingerprint.to_string()
    } else {
        fingerprint.labelled()
    };

    let mut stdout = io::stdout();
    writeln!(stdout, "{}", line)
        .and_then(|_| stdout.flush())
        .map_err(Error::Output)?;

    Ok(())
}

// region:    --- Tests

#[cfg(test)]
mod tests {
    pub type Result<T> = core::result::Result<T, Error>;
    pub type Error = Box<dyn std::error::Error>; // For early dev.

    use std::fs;

    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    const RSA_CERT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/rsa-cert.pem");
    const RSA_CERT_DER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/rsa-cert.der");
    const EC_CERT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/ec-cert.pem");

    const RSA_FINGERPRINT: &str = "F9 28 D2 9A CF 61 60 3A BD F5 60 11 DD FD 7A A9 40 5E 51 6B";

    #[test]
    fn test_fingerprint_from_file() {
        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg(RSA_CERT);
        cmd.assert()
            .success()
            .stdout(format!("{} (Tasmota v8.4.0+)\n", RSA_FINGERPRINT));
    }

    #[test]
    fn test_fingerprint_from_der_file() {
        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg(RSA_CERT_DER);
        cmd.assert()
            .success()
            .stdout(predicate::str::starts_with(RSA_FINGERPRINT));
    }

    #[test]
    fn test_fingerprint_without_label() {
        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg("--no-label").arg(RSA_CERT);
        cmd.assert()
            .success()
            .stdout(format!("{}\n", RSA_FINGERPRINT));
    }

    #[test]
    fn test_fingerprint_from_stdin() -> Result<()> {
        let pem = fs::read(RSA_CERT)?;

        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg("-").write_stdin(pem);
        cmd.assert()
            .success()
            .stdout(predicate::str::contains(RSA_FINGERPRINT));

        Ok(())
    }

    #[test]
    fn test_copied_file_gives_same_fingerprint() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("broker.crt");
        fs::copy(RSA_CERT, &path)?;

        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg(&path);
        cmd.assert()
            .success()
            .stdout(predicate::str::contains(RSA_FINGERPRINT));

        Ok(())
    }

    #[test]
    fn test_invalid_port_is_usage_error() {
        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg("bad::input");
        cmd.assert()
            .code(1)
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("Invalid source"));
    }

    #[test]
    fn test_missing_argument_is_usage_error() {
        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.assert().code(1);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg("--timeout").arg("0").arg("localhost:8883");
        cmd.assert().code(1);
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.pem");

        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg(&path);
        cmd.assert()
            .code(3)
            .stderr(predicate::str::contains("Cannot read certificate file"));
    }

    #[test]
    fn test_ec_certificate_is_key_decode_error() {
        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg(EC_CERT);
        cmd.assert()
            .code(4)
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("is not RSA"));
    }

    #[test]
    fn test_refused_connection_is_connection_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg("--timeout")
            .arg("5")
            .arg(format!("127.0.0.1:{}", port));
        cmd.assert()
            .code(2)
            .stderr(predicate::str::contains("Connection to 127.0.0.1"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_stdout_write_is_error() -> Result<()> {
        let full = fs::OpenOptions::new().write(true).open("/dev/full")?;

        let bin = assert_cmd::cargo::cargo_bin("tasmota-fingerprint");

        let output = std::process::Command::new(bin)
            .arg(RSA_CERT)
            .stdout(std::process::Stdio::from(full))
            .output()?;

        assert_eq!(output.status.code(), Some(3));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Cannot write fingerprint"), "{stderr}");

        Ok(())
    }

    #[test]
    fn test_help() {
        let mut cmd = Command::cargo_bin("tasmota-fingerprint").unwrap();
        cmd.arg("--help");
        cmd.assert()
            .success()
            .stdout(predicate::str::contains("host:port"));
    }
}

// endregion: --- Tests
