mod loader;
#[cfg(feature = "yolo")]
mod ort;
mod traits;

#[cfg(feature = "blip")]
pub mod blip;
pub mod openai;
#[cfg(feature = "yolo")]
pub mod yolo;

pub use traits::*;

use tokio::sync::oneshot;

pub type HandlerPayload<TItem, TOutput> = (
    Vec<TItem>,
    oneshot::Sender<anyhow::Result<Vec<anyhow::Result<TOutput>>>>,
);
