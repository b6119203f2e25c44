use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use withpkgs_installer::InterruptToken;

pub(crate) const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Forwards the first Ctrl-C to `token`; a second one exits immediately.
pub(crate) fn forward_ctrl_c(token: InterruptToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start signal listener runtime")?;

    thread::Builder::new()
        .name("withpkgs-signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                let mut deliveries = 0_u32;
                loop {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        warn!(error = %err, "failed to listen for ctrl-c");
                        return;
                    }
                    deliveries += 1;
                    if deliveries > 1 {
                        warn!("second interrupt received; exiting without waiting");
                        std::process::exit(i32::from(INTERRUPTED_EXIT_CODE));
                    }
                    debug!("forwarding ctrl-c to package scope");
                    token.interrupt();
                }
            });
        })
        .context("failed to spawn signal listener thread")?;
    Ok(())
}
