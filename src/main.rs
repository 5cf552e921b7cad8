use std::sync::Arc;

use anyhow::Result;
use clap::Parser as _;
use event_loop::event_loop;

mod args;
mod dbus;
mod error;
mod event_loop;
mod line_reader;
mod output;
mod protocol;
mod state;
mod supervisor;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = args::Args::parse();
    args.init_tracing_subscriber()?;
    let config = args.config()?;

    let display = output::WaybarSink::stdout(args.max_length);
    let model = Arc::new(state::StateModel::new(Box::new(display)));
    event_loop(model, config).await
}
