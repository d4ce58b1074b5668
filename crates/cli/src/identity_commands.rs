use {
    anyhow::{Result, bail},
    clap::Subcommand,
    secrecy::{ExposeSecret, SecretString},
};

use overmsg_gateway::{RelayState, SessionSettings, open_identity_store};

#[derive(Subcommand)]
pub enum IdentityAction {
    /// Create an identity and print its token.
    Create {
        #[arg(long)]
        name: String,
        /// Credential; prefer the env var over the flag on shared hosts.
        #[arg(long, env = "OVERMSG_PASS", hide_env_values = true)]
        pass: String,
    },
    /// Show an identity's token and creation time.
    Show {
        #[arg(long)]
        name: String,
    },
}

pub async fn handle_identity(action: IdentityAction) -> Result<()> {
    let config = overmsg_config::discover_and_load();
    let identities = open_identity_store(&config).await?;

    match action {
        IdentityAction::Create { name, pass } => {
            let pass = SecretString::new(pass);
            let state = RelayState::new(identities, SessionSettings::from(&config.sessions));
            let token = state
                .create_identity(&name, pass.expose_secret())
                .await
                .map_err(|e| anyhow::anyhow!("cannot create {name:?}: {e}"))?;
            println!("{token}");
        },
        IdentityAction::Show { name } => {
            let Some(identity) = identities.find_by_name(name.trim()).await? else {
                bail!("no identity named {name:?}");
            };
            println!("name:       {}", identity.name);
            println!("token:      {}", identity.token);
            println!("created_at: {} (unix ms)", identity.created_at);
        },
    }
    Ok(())
}
