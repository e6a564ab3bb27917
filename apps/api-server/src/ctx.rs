use crate::{ai::AIHandler, config::Config, upload::UPLOADS_DIR};
use anyhow::Context;
use storage::Storage;

/// Process wide context, created once at boot and cloned into every handler.
///
/// Clones share the same storage operator and model workers.
#[derive(Clone, Debug)]
pub struct Ctx {
    storage: Storage,
    ai_handler: AIHandler,
}

impl Ctx {
    pub fn new(storage: Storage, ai_handler: AIHandler) -> Self {
        Self {
            storage,
            ai_handler,
        }
    }

    /// Prepare the static root and its `uploads/` dir, then spawn the model
    /// workers described by `config`.
    pub async fn init(config: &Config) -> anyhow::Result<Self> {
        let static_dir = config.static_dir();
        tokio::fs::create_dir_all(&static_dir)
            .await
            .with_context(|| format!("failed to create {}", static_dir.display()))?;

        let storage = Storage::new_fs(&static_dir)?;
        storage.create_dir(UPLOADS_DIR).await?;
        tracing::info!("uploads are stored in {}", storage.get_actual_path(UPLOADS_DIR).display());

        let ai_handler = AIHandler::new(config)?;
        tracing::info!(?ai_handler, "models initialized");

        Ok(Self::new(storage, ai_handler))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn ai_handler(&self) -> &AIHandler {
        &self.ai_handler
    }
}
