use {anyhow::Result, clap::Subcommand};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved configuration as TOML.
    Show,
    /// Print the path of the config file in use.
    Path,
}

pub fn handle_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = overmsg_config::discover_and_load();
            config.validate()?;
            print!("{}", toml::to_string_pretty(&config)?);
        },
        ConfigAction::Path => {
            println!("{}", overmsg_config::find_or_default_config_path().display());
        },
    }
    Ok(())
}
