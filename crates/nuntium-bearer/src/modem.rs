//! The radio-daemon seam and bearer activation.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::context::{BearerContext, ContextKind, Proxy, select_contexts};
use crate::error::{BearerError, BearerResult};

/// Boxed future for the object-safe async seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const ACTIVATION_ATTEMPTS: u32 = 3;
pub const ACTIVATION_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Connection-manager view of one modem.
pub trait Modem: Send + Sync {
    /// Radio-daemon object path of the modem, e.g. `/ril_0`.
    fn id(&self) -> &str;

    fn contexts(&self) -> BoxFuture<'_, BearerResult<Vec<BearerContext>>>;

    /// `SetProperty("Active", active)` on a context.
    fn set_context_active<'a>(
        &'a self,
        context_id: &'a str,
        active: bool,
    ) -> BoxFuture<'a, BearerResult<()>>;
}

/// A modem whose contexts come from configuration. Activation only flips
/// the recorded state.
#[derive(Debug)]
pub struct StaticModem {
    id: String,
    contexts: RwLock<Vec<BearerContext>>,
}

impl StaticModem {
    pub fn new(id: impl Into<String>, contexts: Vec<BearerContext>) -> Self {
        Self {
            id: id.into(),
            contexts: RwLock::new(contexts),
        }
    }
}

impl Modem for StaticModem {
    fn id(&self) -> &str {
        &self.id
    }

    fn contexts(&self) -> BoxFuture<'_, BearerResult<Vec<BearerContext>>> {
        Box::pin(async move {
            let contexts = self
                .contexts
                .read()
                .map_err(|_| BearerError::radio("Poisoned", "context table"))?;
            Ok(contexts.clone())
        })
    }

    fn set_context_active<'a>(
        &'a self,
        context_id: &'a str,
        active: bool,
    ) -> BoxFuture<'a, BearerResult<()>> {
        Box::pin(async move {
            let mut contexts = self
                .contexts
                .write()
                .map_err(|_| BearerError::radio("Poisoned", "context table"))?;
            let context = contexts
                .iter_mut()
                .find(|c| c.id == context_id)
                .ok_or_else(|| BearerError::radio("NotFound", context_id))?;
            context.active = active;
            Ok(())
        })
    }
}

/// Toggles a context, retrying while the radio reports it is busy.
pub async fn set_active_with_retry(
    modem: &dyn Modem,
    context_id: &str,
    active: bool,
) -> BearerResult<()> {
    let mut attempt = 1;
    loop {
        match modem.set_context_active(context_id, active).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_busy() && attempt < ACTIVATION_ATTEMPTS => {
                debug!(context = %context_id, attempt, error = %e, "Radio busy, retrying");
                attempt += 1;
                tokio::time::sleep(ACTIVATION_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(BearerError::ActivationFailed {
                    context: context_id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// A context brought up for one transfer.
#[derive(Debug, Clone)]
pub struct Bearer {
    pub context: BearerContext,
    pub proxy: Option<Proxy>,
}

impl Bearer {
    pub fn message_center(&self) -> &str {
        &self.context.message_center
    }

    /// Opens the first usable context in selection order.
    pub async fn open(modem: &dyn Modem, preferred: Option<&str>) -> BearerResult<Self> {
        let contexts = modem.contexts().await?;
        let candidates = select_contexts(&contexts, preferred);
        if candidates.is_empty() {
            return Err(BearerError::NoMmsContext);
        }

        let mut last_error = BearerError::NoMmsContext;
        for candidate in candidates {
            let activated = !candidate.active;
            if activated {
                if let Err(e) = set_active_with_retry(modem, &candidate.id, true).await {
                    warn!(modem = %modem.id(), context = %candidate.id, error = %e, "Activation failed");
                    last_error = e;
                    continue;
                }
            }
            match Self::settle(modem, candidate.clone()).await {
                Ok(bearer) => return Ok(bearer),
                Err(e) => {
                    warn!(modem = %modem.id(), context = %candidate.id, error = %e, "Unusable bearer");
                    if activated {
                        if let Err(e) = set_active_with_retry(modem, &candidate.id, false).await {
                            warn!(modem = %modem.id(), context = %candidate.id, error = %e, "Failed to release bearer");
                        }
                    }
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Re-reads an active context, whose settings such as the proxy are
    /// only complete once it is up.
    async fn settle(modem: &dyn Modem, candidate: BearerContext) -> BearerResult<Self> {
        let context = modem
            .contexts()
            .await?
            .into_iter()
            .find(|c| c.id == candidate.id)
            .unwrap_or(candidate);
        let proxy = context.parsed_proxy()?;
        info!(
            modem = %modem.id(),
            context = %context.id,
            proxy = ?proxy.as_ref().map(ToString::to_string),
            "Bearer up"
        );
        Ok(Self { context, proxy })
    }

    /// Takes down an MMS context. Internet contexts are shared and stay up.
    pub async fn close(self, modem: &dyn Modem) -> BearerResult<()> {
        if self.context.kind != ContextKind::Mms {
            return Ok(());
        }
        debug!(modem = %modem.id(), context = %self.context.id, "Deactivating bearer");
        set_active_with_retry(modem, &self.context.id, false).await
    }
}

/// Shared handle used by the mediator.
pub type SharedModem = Arc<dyn Modem>;
