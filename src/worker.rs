use std::sync::Arc;
use tokio::{
    sync::{
        mpsc::{self, Receiver, Sender},
        oneshot, watch,
    },
    time::MissedTickBehavior,
};

use crate::{
    fetch_account, AccountSnapshot, Backoff, CapabilityTranslator, CommandRequest, DeviceEvent,
    DeviceId, DeviceStatusPayload, Entity, PreparedCommand, RetryTimer, Session, SmartThingsApi,
    SmartThingsError, SmartThingsResult, TimeoutApi, TranslatorAction, TranslatorConfig,
};

type Reply<T> = oneshot::Sender<SmartThingsResult<T>>;

#[derive(Debug)]
enum WorkerRequest {
    Event(DeviceEvent),
    Command {
        entity_id: String,
        request: CommandRequest,
        reply: Reply<()>,
    },
    Sync {
        reply: Option<Reply<usize>>,
    },
    Refresh {
        device_id: DeviceId,
    },
    Reauthenticate {
        token: String,
    },
    Entities {
        reply: oneshot::Sender<Vec<Entity>>,
    },
}

/// Results of remote calls the worker spawned.
enum Completion {
    Synced(SmartThingsResult<AccountSnapshot>),
    Refreshed(DeviceId, SmartThingsResult<DeviceStatusPayload>),
    CommandSent {
        prepared: PreparedCommand,
        result: SmartThingsResult<()>,
        reply: Reply<()>,
    },
    RetrySync,
}

/// Cloneable access to a running translator worker.
#[derive(Debug, Clone)]
pub struct TranslatorClient {
    sender: Sender<WorkerRequest>,
}

impl TranslatorClient {
    pub async fn push_event(&self, event: DeviceEvent) -> SmartThingsResult<()> {
        self.sender.send(WorkerRequest::Event(event)).await?;
        Ok(())
    }

    /// Parse and queue a raw SmartThings event envelope. Envelopes without
    /// device information are dropped.
    pub async fn push_raw_event(&self, payload: &[u8]) -> SmartThingsResult<()> {
        if let Some(event) = DeviceEvent::parse(payload)? {
            self.push_event(event).await?;
        }
        Ok(())
    }

    /// Queue a command for a registered entity. The receiver resolves once the
    /// cloud accepted or rejected it and may simply be dropped.
    pub async fn send_command(
        &self,
        entity_id: impl Into<String>,
        request: CommandRequest,
    ) -> SmartThingsResult<oneshot::Receiver<SmartThingsResult<()>>> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(WorkerRequest::Command {
                entity_id: entity_id.into(),
                request,
                reply,
            })
            .await?;
        Ok(receiver)
    }

    /// Issue a command and wait for its outcome.
    pub async fn issue_command(
        &self,
        entity_id: impl Into<String>,
        request: CommandRequest,
    ) -> SmartThingsResult<()> {
        self.send_command(entity_id, request).await?.await?
    }

    /// Run a sync, or join the one already running, and return the number of
    /// refreshed devices.
    pub async fn sync(&self) -> SmartThingsResult<usize> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(WorkerRequest::Sync { reply: Some(reply) })
            .await?;
        receiver.await?
    }

    /// Queue a sync without waiting for it.
    pub async fn request_sync(&self) -> SmartThingsResult<()> {
        self.sender.send(WorkerRequest::Sync { reply: None }).await?;
        Ok(())
    }

    pub async fn refresh_device(&self, device_id: impl Into<DeviceId>) -> SmartThingsResult<()> {
        self.sender
            .send(WorkerRequest::Refresh {
                device_id: device_id.into(),
            })
            .await?;
        Ok(())
    }

    /// Install a new token and resume syncing after an authentication failure.
    pub async fn reauthenticate(&self, token: impl Into<String>) -> SmartThingsResult<()> {
        self.sender
            .send(WorkerRequest::Reauthenticate {
                token: token.into(),
            })
            .await?;
        Ok(())
    }

    /// Currently registered entities.
    pub async fn entities(&self) -> SmartThingsResult<Vec<Entity>> {
        let (reply, receiver) = oneshot::channel();
        self.sender.send(WorkerRequest::Entities { reply }).await?;
        Ok(receiver.await?)
    }
}

pub struct TranslatorHandle {
    client: TranslatorClient,
    stop_sender: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<SmartThingsResult<()>>,
}

impl TranslatorHandle {
    pub fn client(&self) -> TranslatorClient {
        self.client.clone()
    }

    /// Stops the worker task. Dropping the handle stops it as well.
    pub async fn stop(self) -> SmartThingsResult<()> {
        let _ = self.stop_sender.send(true);
        self.handle.await??;
        Ok(())
    }
}

struct Worker<A> {
    translator: CapabilityTranslator,
    api: TimeoutApi<A>,
    session: Session,
    actions: Sender<TranslatorAction>,
    completions: Sender<Completion>,
    backoff: Backoff,
    retry: RetryTimer,
    attempt: u32,
    sync_in_flight: bool,
    resync_requested: bool,
    sync_waiters: Vec<Reply<usize>>,
    auth_failed: bool,
}

impl<A: SmartThingsApi> Worker<A> {
    async fn emit(&self, actions: Vec<TranslatorAction>) -> SmartThingsResult<()> {
        for action in actions {
            self.actions.send(action).await?;
        }
        Ok(())
    }

    async fn handle_request(&mut self, request: WorkerRequest) -> SmartThingsResult<()> {
        match request {
            WorkerRequest::Event(event) => {
                let resync = matches!(event, DeviceEvent::Changed { .. });
                match self.translator.apply_event(&event) {
                    Ok(actions) => self.emit(actions).await?,
                    Err(err) => log::warn!("Dropping event: {}", err),
                }
                if resync {
                    self.start_sync(None);
                }
            }
            WorkerRequest::Command {
                entity_id,
                request,
                reply,
            } => self.start_command(entity_id, request, reply),
            WorkerRequest::Sync { reply } => self.start_sync(reply),
            WorkerRequest::Refresh { device_id } => self.start_refresh(device_id),
            WorkerRequest::Reauthenticate { token } => {
                log::info!("[{}] reauthenticated", self.session.account());
                self.session.set_token(token);
                self.auth_failed = false;
                self.attempt = 0;
                self.retry.abort();
                self.start_sync(None);
            }
            WorkerRequest::Entities { reply } => {
                let _ = reply.send(self.translator.entities().cloned().collect());
            }
        }
        Ok(())
    }

    async fn handle_completion(&mut self, completion: Completion) -> SmartThingsResult<()> {
        match completion {
            Completion::Synced(fetched) => {
                self.sync_in_flight = false;
                let report = self.translator.apply_sync(fetched);
                let outcome = match &report.error {
                    None => Ok(report.synced.len()),
                    Some(err) => Err(err.clone()),
                };
                self.emit(report.actions).await?;
                match &outcome {
                    Ok(_) => {
                        self.attempt = 0;
                        self.retry.abort();
                    }
                    Err(err) => self.on_failure(err),
                }
                for waiter in self.sync_waiters.drain(..) {
                    let _ = waiter.send(outcome.clone());
                }
                if std::mem::take(&mut self.resync_requested) {
                    self.start_sync(None);
                }
            }
            Completion::Refreshed(device_id, status) => {
                let report = self.translator.apply_refresh(&device_id, status);
                if let Some(err) = &report.error {
                    if matches!(err, SmartThingsError::Auth(_)) {
                        self.on_failure(err);
                    }
                }
                self.emit(report.actions).await?;
            }
            Completion::CommandSent {
                prepared,
                result,
                reply,
            } => {
                match &result {
                    Ok(()) => {
                        let actions = self.translator.complete_command(&prepared);
                        self.emit(actions).await?;
                    }
                    Err(SmartThingsError::Auth(reason)) => {
                        self.on_failure(&SmartThingsError::Auth(reason.clone()));
                        self.emit(vec![TranslatorAction::AuthenticationFailed(reason.clone())])
                            .await?;
                    }
                    Err(err) => log::warn!(
                        "[{}] command {}.{} failed: {}",
                        prepared.device_id,
                        prepared.command.capability,
                        prepared.command.command,
                        err
                    ),
                }
                let _ = reply.send(result);
            }
            Completion::RetrySync => {
                if !self.auth_failed {
                    self.start_sync(None);
                }
            }
        }
        Ok(())
    }

    fn on_failure(&mut self, err: &SmartThingsError) {
        match err {
            SmartThingsError::Auth(_) => {
                log::error!(
                    "[{}] authentication failed, suspending sync until reauthenticated",
                    self.session.account()
                );
                self.auth_failed = true;
                self.retry.abort();
            }
            err if err.is_retryable() => {
                let delay = self.backoff.delay(self.attempt);
                self.attempt = self.attempt.saturating_add(1);
                log::info!(
                    "Retrying sync in {:?} (attempt {})",
                    delay,
                    self.attempt
                );
                self.retry
                    .schedule(self.completions.clone(), Completion::RetrySync, delay);
            }
            _ => {}
        }
    }

    fn periodic_sync(&mut self) {
        if self.auth_failed {
            log::debug!("Skipping periodic sync, awaiting reauthentication");
            return;
        }
        self.start_sync(None);
    }

    /// Spawn a sync unless one is running. Requests arriving meanwhile are
    /// coalesced into a single follow-up sync.
    fn start_sync(&mut self, reply: Option<Reply<usize>>) {
        self.sync_waiters.extend(reply);
        if self.sync_in_flight {
            self.resync_requested = true;
            return;
        }
        self.sync_in_flight = true;
        self.retry.abort();
        let api = self.api.clone();
        let session = self.session.clone();
        let filter = self.translator.filter().clone();
        let completions = self.completions.clone();
        tokio::task::spawn(async move {
            let fetched = match session.begin_sync().await {
                Ok(_guard) => fetch_account(&api, &session, &filter).await,
                Err(err) => Err(err),
            };
            let _ = completions.send(Completion::Synced(fetched)).await;
        });
    }

    fn start_refresh(&mut self, device_id: DeviceId) {
        if !self.translator.devices().contains_device(&device_id) {
            log::debug!("Ignoring refresh of unknown device [{}]", device_id);
            return;
        }
        let api = self.api.clone();
        let session = self.session.clone();
        let completions = self.completions.clone();
        tokio::task::spawn(async move {
            let status = api.device_status(&session, &device_id).await;
            let _ = completions
                .send(Completion::Refreshed(device_id, status))
                .await;
        });
    }

    fn start_command(&mut self, entity_id: String, request: CommandRequest, reply: Reply<()>) {
        let Some(entity) = self.translator.entity(&entity_id) else {
            let _ = reply.send(Err(SmartThingsError::Validation(format!(
                "unknown entity [{}]",
                entity_id
            ))));
            return;
        };
        let prepared = match self.translator.prepare_command(entity, &request) {
            Ok(prepared) => prepared,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };
        let api = self.api.clone();
        let session = self.session.clone();
        let completions = self.completions.clone();
        tokio::task::spawn(async move {
            let result = api
                .execute_command(&session, &prepared.device_id, &prepared.command)
                .await;
            let _ = completions
                .send(Completion::CommandSent {
                    prepared,
                    result,
                    reply,
                })
                .await;
        });
    }
}

/// Start the single-owner worker for one account.
///
/// The worker owns `translator`; everything else talks to it through the
/// returned client and receives its `TranslatorAction`s on the receiver. It
/// syncs immediately and then every `refresh_interval`, bounds every remote
/// call by `request_timeout`, retries transient failures with backoff and
/// stops on `stop`, when the session is closed or
/// when all clients are gone.
pub fn run_translator<A: SmartThingsApi>(
    translator: CapabilityTranslator,
    api: Arc<A>,
    session: Session,
    config: &TranslatorConfig,
) -> SmartThingsResult<(TranslatorHandle, Receiver<TranslatorAction>)> {
    config.validate()?;
    log::trace!("Starting translator for account [{}]", session.account());

    let (request_sender, mut requests) = mpsc::channel(config.channel_size);
    let (action_sender, actions) = mpsc::channel(config.channel_size);
    let (completion_sender, mut completions) = mpsc::channel(config.channel_size);
    let (stop_sender, mut stop_receiver) = watch::channel(false);
    let refresh_interval = config.refresh_interval();
    let closed = session.clone();

    let mut worker = Worker {
        translator,
        api: TimeoutApi::new(api, config.request_timeout()),
        session,
        actions: action_sender,
        completions: completion_sender,
        backoff: Backoff::new(config.retry_initial_delay(), config.retry_max_delay()),
        retry: RetryTimer::new(),
        attempt: 0,
        sync_in_flight: false,
        resync_requested: false,
        sync_waiters: Vec::new(),
        auth_failed: false,
    };

    let handle = tokio::task::spawn(async move {
        let mut interval = tokio::time::interval(refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => worker.handle_request(request).await?,
                    None => {
                        log::trace!("All translator clients dropped. Exiting...");
                        break;
                    }
                },
                Some(completion) = completions.recv() => worker.handle_completion(completion).await?,
                _ = interval.tick() => worker.periodic_sync(),
                changed = stop_receiver.changed() => {
                    if changed.is_err() || *stop_receiver.borrow() {
                        log::trace!("Received stop signal. Exiting...");
                        break;
                    }
                }
                _ = closed.closed() => {
                    log::debug!("Session closed. Exiting...");
                    break;
                }
            }
        }
        worker.retry.abort();
        log::trace!("Exiting translator worker...");
        Ok(())
    });

    Ok((
        TranslatorHandle {
            client: TranslatorClient {
                sender: request_sender,
            },
            stop_sender,
            handle,
        },
        actions,
    ))
}
