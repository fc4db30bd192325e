//! Process-wide [`AsyncGui`] instance.
//!
//! Meant for the composition root of applications that want a single shared
//! façade. Libraries and tests should construct their own [`AsyncGui`].

use crate::config;
use crate::error::Result;
use crate::models::BridgeConfig;
use crate::ui::{AsyncGui, UiDispatcher};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

static INSTANCE: OnceLock<Arc<AsyncGui>> = OnceLock::new();
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Create the process-wide façade, or return the existing one.
///
/// Only the first successful call constructs; later calls ignore their
/// arguments and return the same instance.
pub fn install(
    config: BridgeConfig,
    dispatcher: Arc<dyn UiDispatcher>,
) -> Result<Arc<AsyncGui>> {
    if let Some(gui) = INSTANCE.get() {
        return Ok(Arc::clone(gui));
    }

    let _guard = INSTALL_LOCK.lock();
    if let Some(gui) = INSTANCE.get() {
        return Ok(Arc::clone(gui));
    }

    let gui = Arc::new(AsyncGui::new(config, dispatcher)?);
    let installed = INSTANCE.get_or_init(|| gui);
    tracing::debug!("Process-wide async GUI façade installed");
    Ok(Arc::clone(installed))
}

/// Install using the process-wide configuration from [`config::global`]
pub fn install_default(dispatcher: Arc<dyn UiDispatcher>) -> Result<Arc<AsyncGui>> {
    let config = config::global();
    install(config.as_ref().clone(), dispatcher)
}

/// The process-wide façade, if one has been installed
pub fn get() -> Option<Arc<AsyncGui>> {
    INSTANCE.get().cloned()
}
