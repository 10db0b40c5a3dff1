use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cache;
mod cli;
mod config;
mod ext;
mod integrations;
mod logging;
mod model;
mod render;
mod reports;
mod stats;
mod util;
mod window;

use crate::cli::{Cli, normalize};

fn main() -> Result<()> {
  // Phase 0: environment (.env never overrides what is already set)
  config::load_dotenv();
  let cli = Cli::parse();
  logging::init(cli.verbose, cli.log_json);

  if cli.gen_man {
    let page = util::render_man_page::<Cli>()?;
    print!("{}", page);
    return Ok(());
  }

  // Phase 1: normalize CLI
  let cfg = normalize(cli)?;
  debug!(?cfg, "effective config");

  // Phase 2: fetch + aggregate
  let doc = reports::run(&cfg)?;

  // Phase 3: render
  render::emit(&doc, cfg.format, &cfg.out)
}
