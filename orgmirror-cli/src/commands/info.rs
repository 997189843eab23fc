//! Info command - authenticated user and organization selection

use orgmirror_core::backup::select_organizations;
use orgmirror_core::{Config, HostingApi, Secrets};

use super::github_client;

pub async fn execute(config: &Config) -> anyhow::Result<()> {
    let secrets = Secrets::load()?;
    let client = github_client(config, &secrets)?;

    let user = client.current_user().await?;
    let accessible = client.organizations().await?;
    let selection = select_organizations(&config.enabled_organizations(), &accessible);

    println!("User: {}", user);
    println!();

    println!("Organizations selected for backup:");
    print_list(&selection.selected);

    println!("Accessible organizations not selected (their repositories are NOT backed up):");
    print_list(&selection.unselected);

    println!("Configured organizations not accessible:");
    print_list(&selection.missing);

    Ok(())
}

fn print_list(names: &[String]) {
    if names.is_empty() {
        println!("  (none)");
    }
    for name in names {
        println!("  {}", name);
    }
    println!();
}
