//! Human readable terminal output. Structured logs go to stderr through `tracing`; this goes to stdout.

use crossterm::style::Stylize;

use crate::exchange::Exchange;

const RULE_WIDTH: usize = 60;

pub fn rule() {
    println!("{}", "=".repeat(RULE_WIDTH));
}

pub fn banner(title: &str) {
    rule();
    println!("{}", title.bold());
    rule();
}

pub fn section(title: &str) {
    println!("\n{}", title.bold());
}

pub fn pass(message: impl AsRef<str>) {
    println!("✅ {}", message.as_ref().green());
}

pub fn fail(message: impl AsRef<str>) {
    println!("❌ {}", message.as_ref().red());
}

pub fn warn(message: impl AsRef<str>) {
    println!("⚠️  {}", message.as_ref().yellow());
}

pub fn info(message: impl AsRef<str>) {
    println!("   {}", message.as_ref());
}

/// Pass/fail line for an exchange; headers and bodies too when `verbose`.
pub fn exchange(exchange: &Exchange, verbose: bool) {
    let timing = exchange
        .elapsed_ms()
        .map(|ms| format!(" ({ms}ms)"))
        .unwrap_or_default();

    match (&exchange.verdict, &exchange.failure) {
        (Some(verdict), _) if verdict.is_success() => {
            pass(format!("{}: {verdict}{timing}", exchange.label))
        }
        (Some(verdict), _) if verdict.indicates_ip_block() => {
            fail(format!("{}: {verdict}{timing}", exchange.label));
            warn("this appears to be an IP whitelist issue");
        }
        (Some(verdict), _) => fail(format!("{}: {verdict}{timing}", exchange.label)),
        (None, Some(failure)) => fail(format!("{}: {failure}", exchange.label)),
        (None, None) => fail(format!("{}: no result", exchange.label)),
    }

    if let Some(response) = &exchange.response {
        info(format!(
            "HTTP {} from {}, {} bytes",
            response.status,
            exchange.request.url,
            response.body.len()
        ));
    }

    if verbose {
        section("Request");
        for (name, value) in &exchange.request.headers {
            info(format!("{name}: {value}"));
        }
        println!("{}", exchange.request.body);

        if let Some(response) = &exchange.response {
            section("Response");
            for (name, value) in &response.headers {
                info(format!("{name}: {value}"));
            }
            println!("{}", response.body);
        }
    }
}
