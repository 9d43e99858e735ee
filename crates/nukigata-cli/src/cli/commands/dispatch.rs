use super::super::args::*;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = cli.config.as_deref();
    match cli.cmd {
        Command::Locate(args) => super::locate::run(args, config).await,
        Command::Token => super::token::run(config).await,
        Command::Fetch(args) => super::fetch::run(args, config).await,
        Command::SheetRow(args) => super::sheet::run(args, config).await,
        Command::Orders(args) => super::orders::run(args, config).await,
        Command::Seen(args) => super::seen::run(args, config).await,
    }
}
