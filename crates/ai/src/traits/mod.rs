mod image_caption;
mod object_detection;

use crate::{loader, HandlerPayload};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub use image_caption::*;
pub use object_detection::*;

pub trait Model {
    type Item;
    type Output;

    fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> impl std::future::Future<Output = anyhow::Result<Vec<anyhow::Result<Self::Output>>>> + Send;

    fn batch_size_limit(&self) -> usize;
}

pub type BatchHandlerTx<Item, Output> = mpsc::Sender<HandlerPayload<Item, Output>>;

/// Handle to a model owned by a dedicated worker thread.
///
/// Cloning the handle is cheap and every clone talks to the same worker, so a
/// single model instance is shared by all callers. The worker runs one request
/// at a time. When the last handle is dropped the worker offloads the model
/// and exits.
#[derive(Debug)]
pub struct AIModel<TItem, TOutput> {
    model_id: String, // for better logging
    tx: BatchHandlerTx<TItem, TOutput>,
}

impl<TItem, TOutput> Clone for AIModel<TItem, TOutput> {
    fn clone(&self) -> Self {
        Self {
            model_id: self.model_id.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<TItem, TOutput> AIModel<TItem, TOutput>
where
    TItem: Send + Sync + Clone + Debug + 'static,
    TOutput: Send + Sync + Debug + 'static,
{
    /// Spawn the worker for a model.
    ///
    /// With `offload_duration` set to `None` the model is resident: it is
    /// loaded as soon as the worker starts and kept until shutdown. With
    /// `Some(duration)` it is loaded on first use and dropped after being idle
    /// for `duration`.
    pub fn new<T, TFut, TFn>(
        model_id: String, // for better logging
        create_model: TFn,
        offload_duration: Option<Duration>,
    ) -> anyhow::Result<Self>
    where
        T: Model<Item = TItem, Output = TOutput> + Send + 'static,
        TFut: Future<Output = anyhow::Result<T>> + Send + 'static,
        TFn: Fn() -> TFut + Send + 'static,
    {
        let loader = loader::ModelLoader::new(create_model);
        let (tx, mut rx) = mpsc::channel::<HandlerPayload<TItem, TOutput>>(512);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let worker_model_id = model_id.clone();

        std::thread::Builder::new()
            .name(format!("ai-model-{}", model_id))
            .spawn(move || {
                let local = tokio::task::LocalSet::new();

                local.spawn_local(async move {
                    let model_id = worker_model_id;

                    if offload_duration.is_none() {
                        tracing::info!(model_id = %model_id, "loading resident model");
                        if let Err(e) = loader.load().await {
                            // will be retried on the first request
                            tracing::error!(model_id = %model_id, "failed to load model: {}", e);
                        }
                    }

                    loop {
                        let idle = async {
                            match offload_duration {
                                Some(duration) => tokio::time::sleep(duration).await,
                                None => std::future::pending::<()>().await,
                            }
                        };

                        tokio::select! {
                            _ = idle => {
                                if loader.is_loaded().await {
                                    tracing::debug!(model_id = %model_id, "No message received for {:?}, offload model", offload_duration);
                                    if let Err(e) = loader.offload().await {
                                        tracing::error!(model_id = %model_id, "failed to offload model: {}", e);
                                    }
                                }
                            }
                            payload = rx.recv() => {
                                match payload {
                                    Some((items, result_tx)) => {
                                        // If channel closed,
                                        // we have no way to response, just ignore task.
                                        // This is very useful for task cancellation.
                                        if result_tx.is_closed() {
                                            tracing::debug!(model_id = %model_id, "receiver dropped, skip task");
                                        } else {
                                            let results = match loader.load().await {
                                                Ok(_) => {
                                                    let mut model = loader.model.lock().await;
                                                    match model.as_mut() {
                                                        Some(model) => process_in_batches(model, items).await,
                                                        None => Err(anyhow::anyhow!("failed to load model")),
                                                    }
                                                }
                                                Err(e) => {
                                                    tracing::error!(model_id = %model_id, "failed to load model: {}", e);
                                                    Err(e.context(format!("failed to load model {}", model_id)))
                                                }
                                            };

                                            if result_tx.send(results).is_err() {
                                                tracing::error!(model_id = %model_id, "failed to send results");
                                            }
                                        }
                                    }
                                    _ => {
                                        // this means all tx has been dropped
                                        if loader.is_loaded().await {
                                            tracing::info!(model_id = %model_id, "all tx dropped, offload model and end loop");
                                            if let Err(e) = loader.offload().await {
                                                tracing::error!(model_id = %model_id, "failed to offload model: {}", e);
                                            }
                                        }
                                        break;
                                    }
                                }
                            }
                        }
                    }
                });

                rt.block_on(local);
            })?;

        Ok(Self { model_id, tx })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[tracing::instrument(name = "AIModel::process", err(Debug), skip_all, fields(model_id=%self.model_id))]
    pub async fn process(&self, items: Vec<TItem>) -> anyhow::Result<Vec<anyhow::Result<TOutput>>> {
        let (result_tx, rx) = oneshot::channel();
        match self.tx.send((items, result_tx)).await {
            Ok(_) => {
                tracing::debug!("items sent to model");
            }
            Err(e) => {
                anyhow::bail!("failed to send items: {:?}", e);
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(e) => {
                anyhow::bail!("failed to receive results: {:?}", e);
            }
        }
    }

    #[tracing::instrument(name = "AIModel::process_single", err(Debug), skip_all, fields(model_id=%self.model_id))]
    pub async fn process_single(&self, item: TItem) -> anyhow::Result<TOutput> {
        let results = self.process(vec![item]).await?;
        let result = results
            .into_iter()
            .next()
            .ok_or(anyhow::anyhow!("no result"))??;
        Ok(result)
    }
}

/// Feed `items` to the model in chunks no larger than its batch size limit,
/// keeping the input order in the output.
async fn process_in_batches<T>(
    model: &mut T,
    items: Vec<T::Item>,
) -> anyhow::Result<Vec<anyhow::Result<T::Output>>>
where
    T: Model,
{
    let limit = model.batch_size_limit().max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let chunk: Vec<T::Item> = items.by_ref().take(limit).collect();
        results.extend(model.process(chunk).await?);
    }

    Ok(results)
}
