// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The TCP RPC listener (`spec.md` §6): accepts connections, dispatches
//! `Request`/`Query` to the store/engine, and serves `Subscribe` as a
//! live stream of [`fish_wire::SubscribeMessage`].
//!
//! Only a TCP listener is implemented; `api_address` is the sole
//! configured endpoint (`spec.md` §6 has no Unix-socket config key).

use std::sync::Arc;

use fish_core::event::Bus;
use fish_core::{
    has_permission, Application, ApplicationId, ApplicationTask, ApplicationTaskId, Clock, IdGenerator, Kind, Label, LabelId,
    LabelDefinition, Node, Role, User,
};
use fish_drivers::DriverRegistry;
use fish_engine::{CapacityAccountant, LifecycleEngine};
use fish_store::Store;
use fish_wire::{ProtocolError, Query, Request, Response, SubscribeMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::DaemonError;
use crate::node::NodeController;

/// Everything an RPC connection needs, shared across every accepted
/// socket.
pub struct ListenCtx<C: Clock> {
    pub store: Arc<Store>,
    pub drivers: Arc<DriverRegistry>,
    pub accountant: Arc<CapacityAccountant>,
    pub lifecycle: Arc<LifecycleEngine<C>>,
    pub bus: Arc<Bus>,
    pub node: Node,
    pub node_controller: Arc<NodeController>,
    pub id_gen: IdGenerator,
    pub shutdown: CancellationToken,
}

/// Bind `address` and accept loop until `ctx.shutdown` fires.
pub async fn serve<C: Clock + 'static>(ctx: Arc<ListenCtx<C>>, address: &str) -> Result<(), DaemonError> {
    let listener = TcpListener::bind(address).await?;
    info!(%address, "fish.listener=bound");
    serve_on(ctx, listener).await
}

/// Accept loop over an already-bound listener, handing each connection
/// its own task until `ctx.shutdown` fires. Split from [`serve`] so a
/// caller that needs the bound address up front (e.g. an ephemeral
/// `:0` port in tests) can bind it itself first.
pub async fn serve_on<C: Clock + 'static>(ctx: Arc<ListenCtx<C>>, listener: TcpListener) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(ctx, socket).await {
                        warn!(%peer, %error, "fish.listener=connection_failed");
                    }
                });
            }
        }
    }
    Ok(())
}

struct Caller {
    roles: Vec<String>,
}

impl Caller {
    fn anonymous() -> Self {
        Caller { roles: Vec::new() }
    }

    fn allows(&self, all_roles: &[Role], permission: &str) -> bool {
        has_permission(all_roles, &self.roles, permission)
    }
}

fn resolve_caller<C: Clock>(ctx: &ListenCtx<C>, token: Option<&str>) -> Caller {
    match token.and_then(|name| ctx.store.get(Kind::User, name).ok()) {
        Some(bytes) => match serde_json::from_slice::<User>(&bytes) {
            Ok(user) => Caller { roles: user.roles },
            Err(_) => Caller::anonymous(),
        },
        None => Caller::anonymous(),
    }
}

fn all_roles<C: Clock>(ctx: &ListenCtx<C>) -> Vec<Role> {
    ctx.store.list(Kind::Role, |_, _| true).into_iter().filter_map(|(_, p)| serde_json::from_slice(&p).ok()).collect()
}

async fn handle_connection<C: Clock + 'static>(ctx: Arc<ListenCtx<C>>, mut socket: TcpStream) -> Result<(), ProtocolError> {
    let mut caller = Caller::anonymous();
    loop {
        let request: Request = match fish_wire::read_message(&mut socket).await {
            Ok(r) => r,
            Err(ProtocolError::Closed) => return Ok(()),
            Err(e) => return Err(e),
        };

        if let Request::Hello { token, .. } = &request {
            caller = resolve_caller(&ctx, token.as_deref());
        }

        if let Request::Subscribe { kinds } = request {
            serve_subscription(&ctx, &mut socket, kinds).await?;
            return Ok(());
        }

        let is_shutdown = matches!(request, Request::Shutdown);
        let response = dispatch(&ctx, &caller, request).await;
        fish_wire::write_message(&mut socket, &response).await?;
        if is_shutdown {
            return Ok(());
        }
    }
}

async fn serve_subscription<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    socket: &mut TcpStream,
    kinds: Vec<Kind>,
) -> Result<(), ProtocolError> {
    fish_wire::write_message(socket, &Response::Ok).await?;

    enum Forwarded {
        Event(fish_core::ChangeEvent),
        Resync(Kind),
    }

    let (tx, mut rx) = mpsc::channel(256);
    let mut handles = Vec::new();
    for kind in kinds {
        let tx = tx.clone();
        let mut subscriber = ctx.bus.subscribe(kind);
        handles.push(tokio::spawn(async move {
            loop {
                match subscriber.recv().await {
                    Ok(event) => {
                        if tx.send(Forwarded::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        if tx.send(Forwarded::Resync(kind)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
    drop(tx);

    let result = loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break Ok(()),
            forwarded = rx.recv() => {
                let Some(forwarded) = forwarded else { break Ok(()) };
                let message = match forwarded {
                    Forwarded::Event(event) => SubscribeMessage::Changed { event: event.into() },
                    Forwarded::Resync(kind) => SubscribeMessage::ResyncRequired { kind },
                };
                if let Err(e) = fish_wire::write_message(socket, &message).await {
                    break Err(e);
                }
            }
        }
    };
    for handle in handles {
        handle.abort();
    }
    result
}

async fn dispatch<C: Clock>(ctx: &ListenCtx<C>, caller: &Caller, request: Request) -> Response {
    match handle_request(ctx, caller, request).await {
        Ok(response) => response,
        Err(error) => Response::Error { message: error.to_string() },
    }
}

fn require<C: Clock>(ctx: &ListenCtx<C>, caller: &Caller, permission: &str) -> Result<(), DaemonError> {
    if caller.allows(&all_roles(ctx), permission) {
        Ok(())
    } else {
        Err(fish_core::FishError::PermissionDenied(permission.to_string()).into())
    }
}

fn parse_id<T: std::str::FromStr>(id: &str) -> Result<T, DaemonError> {
    id.parse().map_err(|_| fish_core::FishError::InvalidArgument(format!("malformed id: {id}")).into())
}

async fn handle_request<C: Clock>(ctx: &ListenCtx<C>, caller: &Caller, request: Request) -> Result<Response, DaemonError> {
    match request {
        Request::Ping => Ok(Response::Pong),
        Request::Hello { version, .. } => Ok(Response::Hello { version }),
        Request::Subscribe { .. } => unreachable!("handled by the connection loop before dispatch"),

        Request::Query { query } => handle_query(ctx, caller, query).await,

        Request::LabelCreate { name, version, definitions } => {
            require(ctx, caller, "label.create")?;
            Label::validate(&name, version, &definitions).map_err(fish_core::FishError::InvalidArgument)?;
            let label = Label {
                uid: LabelId::generate(&ctx.id_gen),
                name,
                version,
                definitions,
                creator: "admin".into(),
                created_at_ms: ctx.lifecycle.epoch_ms(),
            };
            ctx.store.put(Kind::Label, label.uid.to_string(), serde_json::to_vec(&label)?).await?;
            Ok(Response::LabelCreated { id: label.uid.to_string() })
        }

        Request::LabelRemove { id } => {
            require(ctx, caller, "label.create")?;
            let label_uid: LabelId = parse_id(&id)?;
            let still_live = ctx
                .store
                .list(Kind::Application, |_, payload| {
                    serde_json::from_slice::<Application>(payload).map(|a| a.label_uid == label_uid).unwrap_or(false)
                })
                .into_iter()
                .filter_map(|(app_id, _)| app_id.parse::<ApplicationId>().ok())
                .any(|app_id| ctx.lifecycle.latest_state(&app_id).map(|s| !s.status.is_resolved()).unwrap_or(true));
            if still_live {
                return Err(fish_core::FishError::Conflict("label has live Applications".into()).into());
            }
            ctx.store.delete(Kind::Label, id).await?;
            Ok(Response::Ok)
        }

        Request::ApplicationCreate { label_uid, owner, metadata } => {
            require(ctx, caller, "application.create")?;
            let label_uid: LabelId = parse_id(&label_uid)?;
            if ctx.store.get(Kind::Label, &label_uid.to_string()).is_err() {
                return Err(fish_core::FishError::NotFound(format!("label {label_uid}")).into());
            }
            let application = Application {
                uid: ApplicationId::generate(&ctx.id_gen),
                label_uid,
                owner,
                metadata,
                created_at_ms: ctx.lifecycle.epoch_ms(),
            };
            ctx.store.put(Kind::Application, application.uid.to_string(), serde_json::to_vec(&application)?).await?;
            Ok(Response::ApplicationCreated { id: application.uid.to_string() })
        }

        Request::ApplicationDeallocate { id } => {
            require(ctx, caller, "application.deallocate")?;
            let application_id: ApplicationId = parse_id(&id)?;
            ctx.lifecycle.request_deallocate(application_id).await?;
            Ok(Response::Ok)
        }

        Request::ApplicationTaskCreate { application_id, task, when, input } => {
            require(ctx, caller, "application.create")?;
            let application_id: ApplicationId = parse_id(&application_id)?;
            if ctx.store.get(Kind::Application, &application_id.to_string()).is_err() {
                return Err(fish_core::FishError::NotFound(format!("application {application_id}")).into());
            }
            let record = ApplicationTask {
                uid: ApplicationTaskId::generate(&ctx.id_gen),
                application_uid: application_id,
                task,
                when,
                input,
                result: Default::default(),
                created_at_ms: ctx.lifecycle.epoch_ms(),
                executed_at_ms: 0,
            };
            ctx.store.put(Kind::ApplicationTask, record.uid.to_string(), serde_json::to_vec(&record)?).await?;
            Ok(Response::ApplicationTaskCreated { id: record.uid.to_string() })
        }

        Request::NodeSetMaintenance { enabled } => {
            require(ctx, caller, "node.maintenance")?;
            ctx.node_controller.set_maintenance(enabled);
            Ok(Response::MaintenanceSet { enabled })
        }

        Request::Shutdown => {
            require(ctx, caller, "node.shutdown")?;
            ctx.shutdown.cancel();
            Ok(Response::ShuttingDown)
        }
    }
}

async fn handle_query<C: Clock>(ctx: &ListenCtx<C>, caller: &Caller, query: Query) -> Result<Response, DaemonError> {
    match query {
        Query::ListLabels => {
            require(ctx, caller, "label.read")?;
            let labels = ctx
                .store
                .list(Kind::Label, |_, _| true)
                .into_iter()
                .filter_map(|(_, p)| serde_json::from_slice::<Label>(&p).ok())
                .collect();
            Ok(Response::Labels { labels })
        }
        Query::GetLabel { id } => {
            require(ctx, caller, "label.read")?;
            let label = ctx.store.get(Kind::Label, &id).ok().and_then(|p| serde_json::from_slice(&p).ok()).map(Box::new);
            Ok(Response::Label { label })
        }
        Query::ListApplications => {
            require(ctx, caller, "application.read")?;
            let applications = ctx
                .store
                .list(Kind::Application, |_, _| true)
                .into_iter()
                .filter_map(|(_, p)| serde_json::from_slice::<Application>(&p).ok())
                .collect();
            Ok(Response::Applications { applications })
        }
        Query::GetApplication { id } => {
            require(ctx, caller, "application.read")?;
            let application = ctx.store.get(Kind::Application, &id).ok().and_then(|p| serde_json::from_slice(&p).ok()).map(Box::new);
            Ok(Response::Application { application })
        }
        Query::GetApplicationState { application_id } => {
            require(ctx, caller, "application.read")?;
            let application_id: ApplicationId = parse_id(&application_id)?;
            let state = ctx.lifecycle.latest_state(&application_id).map(Box::new);
            Ok(Response::ApplicationState { state })
        }
        Query::GetApplicationResource { application_id } => {
            require(ctx, caller, "application.read")?;
            let application_id: ApplicationId = parse_id(&application_id)?;
            let resource = ctx.lifecycle.live_resource(&application_id).map(Box::new);
            Ok(Response::ApplicationResource { resource })
        }
        Query::ListApplicationTasks { application_id } => {
            require(ctx, caller, "application.read")?;
            let application_id: ApplicationId = parse_id(&application_id)?;
            let tasks = ctx
                .store
                .list(Kind::ApplicationTask, |_, payload| {
                    serde_json::from_slice::<ApplicationTask>(payload).map(|t| t.application_uid == application_id).unwrap_or(false)
                })
                .into_iter()
                .filter_map(|(_, p)| serde_json::from_slice(&p).ok())
                .collect();
            Ok(Response::ApplicationTasks { tasks })
        }
        Query::ListNodes => {
            // No seeded role names a node permission; listing nodes is open to any caller.
            let nodes = ctx.store.list(Kind::Node, |_, _| true).into_iter().filter_map(|(_, p)| serde_json::from_slice(&p).ok()).collect();
            Ok(Response::Nodes { nodes })
        }
    }
}
