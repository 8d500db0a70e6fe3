use std::{net::IpAddr, path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use hcprobe::{
    client::{RawRequest, SOAP_CONTENT_TYPE, XML_CONTENT_TYPE},
    console,
    diagnosis::IpStatus,
    env_config::ConfigOverrides,
    monitor::{self, MonitorOptions},
    public_ip,
    report::{write_report, Report},
    whitelist, EnvConfig, Exchange, Probe,
};
use hostconnect_xml::{infer_reply_tag, HostConnectRequest, OptionInfoQuery, SoapSearch};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(version, about = "HostConnect IP allowlist diagnostics", arg_required_else_help(true))]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Write a JSON report of the run
    #[arg(long, global = true)]
    report: bool,

    /// Directory for JSON reports
    #[arg(long, global = true)]
    report_dir: Option<PathBuf>,

    /// Print request and response headers and bodies
    #[arg(long, short, global = true)]
    verbose: bool,

    /// HostConnect API URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// The allowlisted address to compare against
    #[arg(long, global = true)]
    expected_ip: Option<IpAddr>,

    /// Also consult the EC2 instance metadata service
    #[arg(long, global = true)]
    ec2: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show the current public IP and compare it with the expected one
    Ip {
        /// Query every source instead of stopping at the first answer
        #[arg(long)]
        survey: bool,
    },

    /// Resolve the API host and check that it answers HTTP
    Dns,

    /// Send a PingRequest
    Ping,

    /// Send an AgentInfoRequest, the allowlist probe
    Auth {
        #[arg(long)]
        account_info: bool,
    },

    /// Send an OptionInfoRequest
    Search(SearchArgs),

    /// Send a SOAP SearchTours request
    Soap {
        /// Endpoint, defaults to the configured SOAP URL
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value = "South Africa")]
        country: String,
        #[arg(long, default_value = "Cape Town")]
        destination: String,
    },

    /// POST a raw XML payload read from a file
    Send {
        file: PathBuf,
        /// Send as SOAP to the SOAP URL
        #[arg(long)]
        soap: bool,
        /// Reply element that marks success, inferred from the payload when omitted
        #[arg(long)]
        expect: Option<String>,
    },

    /// Full allowlist check: address, reachability, authentication, search
    Check,

    /// Repeat address lookup, ping and authentication to spot unstable VPN routing
    Monitor {
        #[arg(long, default_value_t = 5)]
        attempts: u32,
        #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
        interval: Duration,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Defaults to the configured search button
    #[arg(long)]
    button: Option<String>,
    #[arg(long)]
    destination: Option<String>,
    #[arg(long)]
    opt: Option<String>,
    /// Defaults to the configured search info code
    #[arg(long)]
    info: Option<String>,
    #[arg(long)]
    date_from: Option<String>,
    #[arg(long)]
    date_to: Option<String>,
    #[arg(long)]
    adults: Option<u32>,
}

impl SearchArgs {
    /// Unset values fall back to the configured search.
    fn into_query(self, config: &EnvConfig) -> OptionInfoQuery {
        OptionInfoQuery {
            button_name: self.button.unwrap_or_else(|| config.search_button.clone()),
            destination: self
                .destination
                .or_else(|| Some(config.search_destination.clone())),
            opt: self.opt,
            info: self.info.unwrap_or_else(|| config.search_info.clone()),
            date_from: self.date_from,
            date_to: self.date_to,
            adults: self.adults,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_env("HCPROBE_LOG"))
        .init();

    let Cli { global, command } = Cli::parse();

    let config = EnvConfig::load(ConfigOverrides {
        api_url: global.api_url.clone(),
        expected_ip: global.expected_ip,
        report_dir: global.report_dir.clone(),
        ec2_metadata: global.ec2.then_some(true),
        ..Default::default()
    })
    .context("loading configuration")?;

    let probe = Probe::new(config).context("building http client")?;
    let ok = run(&probe, &global, command).await?;

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Runs one command. `Ok(false)` means the probe ran but found a problem.
async fn run(probe: &Probe, global: &GlobalArgs, command: Command) -> anyhow::Result<bool> {
    let config = &probe.config;

    match command {
        Command::Ip { survey } => {
            console::banner(&format!("Public IP check (hcprobe v{VERSION})"));

            let ok = if survey {
                let survey =
                    public_ip::survey(&probe.http, &config.ip_sources, config.ip_timeout()).await;
                for result in &survey.results {
                    match (&result.ip, &result.error) {
                        (Some(ip), _) => console::pass(format!("{}: {ip}", result.source)),
                        (None, Some(err)) => console::fail(format!("{}: {err}", result.source)),
                        (None, None) => console::fail(&result.source),
                    }
                }
                if survey.consistent() {
                    console::pass("all sources agree");
                } else {
                    console::warn(format!(
                        "sources disagree or none answered: {:?}",
                        survey.distinct
                    ));
                }

                let first = survey.first_ip();
                let status = IpStatus::evaluate(first, config.expected_ip, config.local_ip);
                print_ip_status(status, first, config);
                save(global, probe, "ip_survey", "Public IP survey", &survey)?;

                survey.consistent() && matches!(status, IpStatus::Match | IpStatus::Unverified)
            } else {
                let current = probe.current_ip().await;
                if let Some(observation) = &current.observation {
                    console::info(format!(
                        "{} via {} ({}ms)",
                        observation.ip, observation.source, observation.elapsed_ms
                    ));
                }
                if let Some(ec2) = &current.ec2 {
                    console::info(format!(
                        "EC2 instance {} in {} ({}), public IP {}",
                        ec2.instance_id, ec2.region, ec2.availability_zone, ec2.public_ip
                    ));
                }
                if let Some(err) = &current.error {
                    console::fail(err);
                }

                let status =
                    IpStatus::evaluate(current.ip(), config.expected_ip, config.local_ip);
                print_ip_status(status, current.ip(), config);
                save(global, probe, "ip_check", "Public IP check", &current)?;

                matches!(status, IpStatus::Match | IpStatus::Unverified)
            };

            console::rule();
            Ok(ok)
        }
        Command::Dns => {
            console::banner("DNS and routing");

            let resolved = probe.client.resolve_host().await;
            match &resolved {
                Ok(addrs) => console::pass(format!("{} resolves to {addrs:?}", probe.client.api_url())),
                Err(err) => console::fail(format!("DNS resolution failed: {err}")),
            }

            let reachability = probe.client.reachability().await;
            match (reachability.status, &reachability.error) {
                (Some(status), _) => console::pass(format!(
                    "API endpoint reachable (status {status}, {}ms)",
                    reachability.elapsed_ms
                )),
                (None, Some(err)) => console::fail(format!("cannot reach API: {err}")),
                (None, None) => console::fail("cannot reach API"),
            }

            #[derive(Serialize)]
            struct DnsReport<'a> {
                addresses: Vec<IpAddr>,
                error: Option<String>,
                reachability: &'a hcprobe::client::Reachability,
            }
            let (addresses, error) = match resolved {
                Ok(addrs) => (addrs, None),
                Err(err) => (vec![], Some(err.to_string())),
            };
            let ok = error.is_none() && reachability.reachable();
            save(
                global,
                probe,
                "dns_check",
                "DNS resolution and reachability",
                &DnsReport {
                    addresses,
                    error,
                    reachability: &reachability,
                },
            )?;

            console::rule();
            Ok(ok)
        }
        Command::Ping => single(probe, global, HostConnectRequest::Ping, "ping").await,
        Command::Auth { account_info } => {
            single(
                probe,
                global,
                HostConnectRequest::AgentInfo {
                    return_account_info: account_info,
                },
                "auth",
            )
            .await
        }
        Command::Search(args) => {
            let query = args.into_query(config);
            single(probe, global, HostConnectRequest::OptionInfo(query), "search").await
        }
        Command::Soap {
            url,
            country,
            destination,
        } => {
            console::banner("SOAP SearchTours");
            let exchange = probe
                .client
                .send_soap(&SoapSearch::new(country, destination), url.as_deref())
                .await;
            finish_exchange(probe, global, exchange, "soap_search")
        }
        Command::Send { file, soap, expect } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let Some(expect) = expect.or_else(|| infer_reply_tag(&body)) else {
                anyhow::bail!("cannot infer the reply element of {}; pass --expect", file.display());
            };

            console::banner(&format!("Raw request from {}", file.display()));
            let exchange = probe
                .client
                .post_raw(RawRequest {
                    label: "RawRequest",
                    url: if soap {
                        probe.client.soap_url()
                    } else {
                        probe.client.api_url()
                    },
                    body,
                    content_type: if soap { SOAP_CONTENT_TYPE } else { XML_CONTENT_TYPE },
                    soap_action: soap.then_some(""),
                    expected_reply: &expect,
                })
                .await;
            finish_exchange(probe, global, exchange, "raw_request")
        }
        Command::Check => {
            console::banner("HostConnect IP whitelist check");
            console::info(format!("API endpoint: {}", probe.client.api_url()));

            let report = whitelist::run(probe, whitelist::default_search(probe)).await;

            console::section("Current IP");
            if let Some(err) = &report.current_ip.error {
                console::fail(err);
            }
            print_ip_status(report.ip_status, report.current_ip.ip(), config);

            console::section("Connectivity");
            match (report.reachability.status, &report.reachability.error) {
                (Some(status), _) => console::pass(format!(
                    "API endpoint reachable (status {status}, {}ms)",
                    report.reachability.elapsed_ms
                )),
                (None, err) => console::fail(format!(
                    "cannot reach API: {}",
                    err.as_deref().unwrap_or("unknown error")
                )),
            }

            if let Some(auth) = &report.auth {
                console::section("Authentication");
                console::exchange(auth, global.verbose);
            }
            if let Some(search) = &report.search {
                console::section("Search");
                console::exchange(search, global.verbose);
            }

            console::section("Result");
            if report.ready() {
                console::pass(format!("{:?}: {}", report.diagnosis, report.status));
            } else {
                console::fail(format!("{:?}: {}", report.diagnosis, report.status));
            }
            for recommendation in &report.recommendations {
                console::info(recommendation);
            }

            save(global, probe, "whitelist_check", "HostConnect IP whitelist check", &report)?;
            console::rule();
            Ok(report.ready())
        }
        Command::Monitor { attempts, interval } => {
            console::banner("IP consistency and HostConnect responses");

            let report = monitor::run(probe, MonitorOptions { attempts, interval }, |attempt| {
                console::section(&format!("Attempt {}", attempt.number));
                match (&attempt.ip, &attempt.ip_error) {
                    (Some(ip), _) => console::info(format!("current IP: {ip}")),
                    (None, err) => console::fail(format!(
                        "IP check failed: {}",
                        err.as_deref().unwrap_or("unknown error")
                    )),
                }
                for exchange in [&attempt.ping, &attempt.auth].into_iter().flatten() {
                    console::exchange(exchange, global.verbose);
                }
            })
            .await;

            let summary = &report.summary;
            console::section("Summary");
            if summary.stable {
                console::pass(format!("exit IP stable: {:?}", summary.distinct_ips));
            } else {
                console::warn(format!("exit IP changed between attempts: {:?}", summary.distinct_ips));
            }
            console::info(format!(
                "ping ok {}/{}, auth ok {}/{}, ip blocked {}",
                summary.ping_ok, summary.attempts, summary.auth_ok, summary.attempts, summary.ip_blocked
            ));

            save(global, probe, "vpn_consistency", "IP consistency over time", &report)?;
            console::rule();
            Ok(summary.stable && summary.auth_ok == summary.attempts)
        }
    }
}

async fn single(
    probe: &Probe,
    global: &GlobalArgs,
    request: HostConnectRequest,
    prefix: &str,
) -> anyhow::Result<bool> {
    console::banner(request.request_tag());
    let exchange = probe.client.send(&request).await;
    finish_exchange(probe, global, exchange, prefix)
}

fn finish_exchange(
    probe: &Probe,
    global: &GlobalArgs,
    exchange: Exchange,
    prefix: &str,
) -> anyhow::Result<bool> {
    console::exchange(&exchange, global.verbose);
    let purpose = format!("{} against {}", exchange.label, exchange.request.url);
    save(global, probe, prefix, &purpose, &exchange)?;
    console::rule();
    Ok(exchange.succeeded())
}

fn print_ip_status(status: IpStatus, current: Option<IpAddr>, config: &EnvConfig) {
    let current = current.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
    match (status, config.expected_ip) {
        (IpStatus::Match, _) => console::pass(format!("current IP {current} is the expected one")),
        (IpStatus::Unverified, _) => console::info(format!(
            "current IP {current} (no expected IP configured)"
        )),
        (IpStatus::LocalAddress, _) => {
            console::fail(format!("current IP {current} is the local address; is the VPN connected?"))
        }
        (IpStatus::Mismatch, Some(expected)) => {
            console::fail(format!("wrong IP: expected {expected}, got {current}"))
        }
        (IpStatus::Mismatch, None) | (IpStatus::Unknown, _) => {
            console::fail(format!("current IP {current} could not be verified"))
        }
    }
}

fn save<T: Serialize>(
    global: &GlobalArgs,
    probe: &Probe,
    prefix: &str,
    purpose: &str,
    body: &T,
) -> anyhow::Result<()> {
    if global.report {
        let path = write_report(&probe.config.report_dir, prefix, &Report::new(purpose, body))
            .context("writing report")?;
        console::info(format!("report saved to {}", path.display()));
    }
    Ok(())
}
