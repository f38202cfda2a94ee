//! `logtail tail`: stream request logs until interrupted.

use tracing::debug;

use logtail_core::Tailer;
use logtail_core::session::session_client;

use crate::cli::{GlobalOpts, TailArgs};
use crate::config::{self, ResolvedTail};
use crate::error::CliError;
use crate::output::SpinnerStatus;

pub async fn handle(args: TailArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load_config()?;
    let ResolvedTail { tailer, timeout } = config::resolve_tail(global, &args, &cfg)?;

    debug!(
        api_base = %tailer.api_base,
        device_name = %tailer.device_name,
        feature = %tailer.feature,
        output = %tailer.output,
        "starting tail session"
    );

    let client = session_client(&tailer, timeout)?;
    let status = SpinnerStatus::new(global.quiet, tailer.color);

    Tailer::new(tailer, client).with_status(status).run().await?;
    Ok(())
}
