use deploykit::credentials::pki::generate_service_bundle;

/// Print `export` lines for a development mTLS bundle
///
/// Usage: gen-certs <service-name> [dns-name...]
///
/// Without DNS names the leaf is issued for `localhost`. Evaluate the output
/// in a shell to run a service with `ENV=prod CREDENTIAL_STRATEGY=peer-pinned`
/// locally: `eval "$(cargo run --bin gen-certs -- orders)"`
fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let service_name = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: gen-certs <service-name> [dns-name...]"))?;

    let mut dns_names: Vec<String> = args.collect();
    if dns_names.is_empty() {
        dns_names.push("localhost".to_string());
    }

    let bundle = generate_service_bundle(&service_name, &dns_names)?;
    print!("{}", bundle.shell_exports());

    eprintln!(
        "# generated CA and leaf for {} (SANs: {})",
        service_name,
        dns_names.join(", ")
    );
    Ok(())
}
