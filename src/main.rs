use bifrost::cdn::CdnRangeClient;
use bifrost::certificate::CertificateOrchestrator;
use bifrost::config::OnboardingConfig;
use bifrost::control_plane::{
    ControlPlaneClient, HttpCertificateAuthority, HttpRoutingControlPlane,
};
use bifrost::coordinator::Coordinator;
use bifrost::resolver::ResolverClient;
use bifrost::routing::RuleManager;
use bifrost::validation::parse_ipv4;
use bifrost::verify::VerificationEngine;
use bifrost::{BifrostError, Domain};
use clap::{Arg, ArgMatches, Command};
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

fn cli() -> Command {
    Command::new("bifrost")
        .about("Onboards customer domains: DNS verification, TLS certificates, routing rules")
        .subcommand_required(true)
        .subcommand(
            Command::new("request")
                .about("Request a TLS certificate for a domain")
                .arg(Arg::new("domain").required(true))
                .arg(
                    Arg::new("email")
                        .long("email")
                        .value_name("ADDRESS")
                        .help("Contact email for the certificate request"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Provision routing, attach the certificate, and check DNS")
                .arg(Arg::new("domain").required(true)),
        )
        .subcommand(
            Command::new("delete")
                .about("Tear down the certificate and routing for a domain")
                .arg(Arg::new("domain").required(true)),
        )
        .subcommand(
            Command::new("verify")
                .about("Check whether a domain resolves to the expected addresses")
                .arg(Arg::new("domain").required(true))
                .arg(
                    Arg::new("expected")
                        .value_name("IPV4")
                        .num_args(0..)
                        .help("Expected A-record addresses (defaults to configured set)"),
                ),
        )
        .subcommand(Command::new("list").about("List domains routed on the configured listener"))
}

fn build_coordinator(config: &OnboardingConfig) -> Result<Coordinator, BifrostError> {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    let plane_client = ControlPlaneClient::new(
        http.clone(),
        config.control_plane_url.clone(),
        config.control_plane_token.clone(),
    );
    let ca = Arc::new(HttpCertificateAuthority::new(plane_client.clone()));
    let plane = Arc::new(HttpRoutingControlPlane::new(plane_client));

    let lookup = Arc::new(ResolverClient::new(config.dns_timeout));
    let cdn = CdnRangeClient::new(http, config.cdn_ranges_url.clone());
    let verifier = VerificationEngine::new(lookup, cdn, config.clone());

    let rules = RuleManager::new(plane.clone(), config.listener_id.clone());
    let certificates = CertificateOrchestrator::new(ca, plane.clone(), config.clone());

    Ok(Coordinator::new(
        certificates,
        rules,
        verifier,
        plane,
        config.clone(),
    ))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => error!(error = %e, "failed to serialize response"),
    }
}

async fn run(matches: ArgMatches) -> Result<ExitCode, BifrostError> {
    let config = OnboardingConfig::from_env()?;

    match matches.subcommand() {
        Some(("request", sub)) => {
            config.require_control_plane()?;
            let domain: Domain = sub.get_one::<String>("domain").unwrap().parse()?;
            let email = sub.get_one::<String>("email").map(String::as_str);
            let coordinator = build_coordinator(&config)?;
            let response = coordinator.request(&domain, email).await?;
            print_json(&response);
            Ok(ExitCode::SUCCESS)
        }
        Some(("check", sub)) => {
            config.require_control_plane()?;
            let domain: Domain = sub.get_one::<String>("domain").unwrap().parse()?;
            let coordinator = build_coordinator(&config)?;
            let response = coordinator.check(&domain).await?;
            print_json(&response);
            Ok(ExitCode::SUCCESS)
        }
        Some(("delete", sub)) => {
            config.require_control_plane()?;
            let domain: Domain = sub.get_one::<String>("domain").unwrap().parse()?;
            let coordinator = build_coordinator(&config)?;
            let response = coordinator.delete(&domain).await?;
            print_json(&response);
            Ok(ExitCode::SUCCESS)
        }
        Some(("verify", sub)) => {
            let domain: Domain = sub.get_one::<String>("domain").unwrap().parse()?;
            let expected: Vec<Ipv4Addr> = match sub.get_many::<String>("expected") {
                Some(values) => values
                    .map(|s| parse_ipv4(s))
                    .collect::<Result<_, _>>()?,
                None => config.expected_addresses.clone(),
            };
            let coordinator = build_coordinator(&config)?;
            let response = coordinator.verify(&domain, &expected).await?;
            print_json(&response);
            // Parity with the operator tooling: non-zero exit when DNS does
            // not point at the service yet
            if response.message == "not matched" {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Some(("list", _)) => {
            config.require_control_plane()?;
            let coordinator = build_coordinator(&config)?;
            let response = coordinator.list().await?;
            print_json(&response);
            Ok(ExitCode::SUCCESS)
        }
        _ => unreachable!("subcommand is required"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();

    match run(matches).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "operation failed");
            ExitCode::FAILURE
        }
    }
}
