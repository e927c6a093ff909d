//! Async runtime for one peer.
//!
//! A [`Runtime`] opens rooms and joins them over any [`Transport`]. Each
//! session is a single task that owns the [`Peer`] and applies events one at a
//! time:
//!
//! ```text
//!  SessionHandle ──control──┐
//!                           ▼
//!  channel readers ──┐   ┌───────┐   PeerAction   ┌─────────────────────┐
//!  acceptor ─────────┼──>│ Peer  │ ─────────────> │ sends, dials, timers│
//!  timers / dials ───┘   └───────┘                │ presentation        │
//!                                                 └─────────────────────┘
//! ```
//!
//! Readers, the acceptor, dials and timers run as their own tasks and only
//! ever talk to the session task through its inbox, so every write to the
//! game state and the channel set happens on one task.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use tandem_core::{
    ChannelId, Command, ContentProvider, Environment, Peer, PeerAction, PeerEvent, PeerSnapshot,
    Presentation, ProtocolConfig, RoleKind, RoomCode, SessionError, Timer,
    error::TransportError,
    room::personal_address,
    transport::{Channel, ChannelReceiver, ChannelSender, Listener, Transport},
};
use tandem_proto::{ParticipantId, PeerAddr};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::AppError;

/// Opens and joins rooms over a transport.
pub struct Runtime<T, E> {
    transport: Arc<T>,
    env: E,
    config: ProtocolConfig,
    content: Arc<dyn ContentProvider>,
}

impl<T: Transport, E: Environment> Runtime<T, E> {
    /// Runtime sharing `transport` across every session it starts.
    pub fn new(
        transport: Arc<T>,
        env: E,
        config: ProtocolConfig,
        content: Arc<dyn ContentProvider>,
    ) -> Self {
        Self { transport, env, config, content }
    }

    /// Open a new room and coordinate it.
    ///
    /// Room codes that are already bound are replaced by fresh ones, never
    /// reused, up to `room_code_attempts` times.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AddressTaken`] if every code tried was taken
    /// - [`SessionError::Config`] or [`SessionError::Command`] for bad input
    pub async fn host(
        &self,
        name: &str,
        category: &str,
        presentation: Box<dyn Presentation>,
    ) -> Result<SessionHandle, AppError> {
        self.config.validate().map_err(SessionError::from)?;
        let mut tried: Vec<RoomCode> = Vec::new();

        loop {
            let code = RoomCode::generate_excluding(&self.env, &tried);
            let address = code.to_address();

            match self.transport.listen(&address).await {
                Ok(listener) => {
                    let (peer, actions) = Peer::host(
                        self.env.clone(),
                        self.config.clone(),
                        Arc::clone(&self.content),
                        address.clone(),
                        name,
                        category,
                    )?;
                    info!(room = %code, "room open");

                    let (mut driver, inbox) = self.driver(peer, address, presentation);
                    driver.listener = Some(listener);
                    driver.execute(actions);
                    driver.execute(vec![PeerAction::Listen]);
                    return Ok(driver.spawn(inbox, Some(code)));
                },
                Err(TransportError::AddressTaken(address)) => {
                    tried.push(code);
                    if tried.len() >= self.config.room_code_attempts as usize {
                        return Err(SessionError::AddressTaken(address).into());
                    }
                    warn!(%address, attempt = tried.len(), "room code taken; trying another");
                },
                Err(err) => return Err(SessionError::from(err).into()),
            }
        }
    }

    /// Join the room behind `code`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Unreachable`] if nobody hosts `code`
    /// - [`SessionError::Config`] or [`SessionError::Command`] for bad input
    pub async fn join(
        &self,
        code: &RoomCode,
        name: &str,
        presentation: Box<dyn Presentation>,
    ) -> Result<SessionHandle, AppError> {
        self.config.validate().map_err(SessionError::from)?;
        let (address, listener) = self.bind_personal().await?;
        let room = code.to_address();

        let peer = Peer::join(
            self.env.clone(),
            self.config.clone(),
            Arc::clone(&self.content),
            address.clone(),
            name,
            room.clone(),
        )?;
        let channel = self.transport.connect(&address, &room).await.map_err(SessionError::from)?;
        info!(room = %code, %address, "joined room");

        let (mut driver, inbox) = self.driver(peer, address, presentation);
        driver.listener = Some(listener);
        let (channel, remote) = driver.open(channel);
        if let Err(error) = driver.dispatch(PeerEvent::Connected { channel, remote }) {
            warn!(%error, "initial connect rejected");
        }
        Ok(driver.spawn(inbox, Some(code.clone())))
    }

    /// Reserve a personal address. Promoted followers accept channels there.
    async fn bind_personal(&self) -> Result<(PeerAddr, T::Listener), AppError> {
        let mut attempts = 1;
        loop {
            let address = personal_address(&self.env);
            match self.transport.listen(&address).await {
                Ok(listener) => return Ok((address, listener)),
                Err(TransportError::AddressTaken(_)) if attempts < self.config.room_code_attempts => {
                    attempts += 1;
                },
                Err(err) => return Err(SessionError::from(err).into()),
            }
        }
    }

    fn driver(
        &self,
        peer: Peer<E>,
        address: PeerAddr,
        presentation: Box<dyn Presentation>,
    ) -> (Driver<T, E>, Inbox<T>) {
        let (events, inbox) = mpsc::unbounded_channel();
        let driver = Driver {
            peer,
            transport: Arc::clone(&self.transport),
            env: self.env.clone(),
            address,
            presentation,
            senders: HashMap::new(),
            readers: HashMap::new(),
            timers: HashMap::new(),
            next_timer: 0,
            next_channel: 0,
            listener: None,
            acceptor: None,
            events,
        };
        (driver, inbox)
    }
}

/// Control side of a running session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    control: mpsc::UnboundedSender<Control>,
    id: ParticipantId,
    room: Option<RoomCode>,
}

impl SessionHandle {
    /// Own participant id.
    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    /// Code of the room this session was opened or joined with.
    pub fn room(&self) -> Option<&RoomCode> {
        self.room.as_ref()
    }

    /// Apply a command and wait for the verdict.
    pub async fn command(&self, command: Command) -> Result<(), AppError> {
        let (reply, verdict) = oneshot::channel();
        self.control.send(Control::Command(command, reply)).map_err(|_| AppError::Stopped)?;
        verdict.await.map_err(|_| AppError::Stopped)?.map_err(AppError::from)
    }

    /// Leave the lobby. Coordinator only.
    pub async fn start_session(&self) -> Result<(), AppError> {
        self.command(Command::StartSession).await
    }

    /// Move to the next player.
    pub async fn advance_turn(&self) -> Result<(), AppError> {
        self.command(Command::AdvanceTurn).await
    }

    /// Swap the prompt for a forfeit.
    pub async fn choose_forfeit(&self) -> Result<(), AppError> {
        self.command(Command::ChooseForfeit).await
    }

    /// Remove a participant. Coordinator only.
    pub async fn kick(&self, id: ParticipantId) -> Result<(), AppError> {
        self.command(Command::Kick(id)).await
    }

    /// Add a player on this device. Coordinator only.
    pub async fn add_local_player(&self, name: impl Into<String>) -> Result<(), AppError> {
        self.command(Command::AddLocalPlayer(name.into())).await
    }

    /// Switch category. Coordinator only.
    pub async fn select_category(&self, category: impl Into<String>) -> Result<(), AppError> {
        self.command(Command::SelectCategory(category.into())).await
    }

    /// Current view of the peer.
    pub async fn snapshot(&self) -> Result<PeerSnapshot, AppError> {
        let (reply, snapshot) = oneshot::channel();
        self.control.send(Control::Snapshot(reply)).map_err(|_| AppError::Stopped)?;
        snapshot.await.map_err(|_| AppError::Stopped)
    }

    /// Stop the session task, closing every channel and timer.
    pub fn shutdown(&self) {
        let _ = self.control.send(Control::Shutdown);
    }
}

enum Control {
    Command(Command, oneshot::Sender<Result<(), SessionError>>),
    Snapshot(oneshot::Sender<PeerSnapshot>),
    Shutdown,
}

/// Events produced by the session's helper tasks.
enum Internal<S, R> {
    Accepted(Channel<S, R>),
    Connected(Channel<S, R>),
    ConnectFailed { remote: PeerAddr, error: TransportError },
    Received { channel: ChannelId, frame: Bytes },
    Closed(ChannelId),
    TimerFired { timer: Timer, generation: u64 },
}

type Inbox<T> =
    mpsc::UnboundedReceiver<Internal<<T as Transport>::Sender, <T as Transport>::Receiver>>;

struct Driver<T: Transport, E> {
    peer: Peer<E>,
    transport: Arc<T>,
    env: E,
    address: PeerAddr,
    presentation: Box<dyn Presentation>,
    senders: HashMap<ChannelId, T::Sender>,
    readers: HashMap<ChannelId, JoinHandle<()>>,
    /// Armed timers with the generation their firing must carry.
    timers: HashMap<Timer, (u64, JoinHandle<()>)>,
    next_timer: u64,
    next_channel: u64,
    listener: Option<T::Listener>,
    acceptor: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<Internal<T::Sender, T::Receiver>>,
}

impl<T: Transport, E: Environment> Driver<T, E> {
    fn spawn(self, inbox: Inbox<T>, room: Option<RoomCode>) -> SessionHandle {
        let (control, requests) = mpsc::unbounded_channel();
        let handle = SessionHandle { control, id: self.peer.id().clone(), room };
        let span = info_span!("peer", addr = %self.address);
        tokio::spawn(self.run(requests, inbox).instrument(span));
        handle
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Control>, mut inbox: Inbox<T>) {
        let mut released = false;
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Control::Command(command, reply)) => {
                        let result = self.dispatch(PeerEvent::Command(command));
                        let _ = reply.send(result);
                    },
                    Some(Control::Snapshot(reply)) => {
                        let _ = reply.send(self.peer.snapshot());
                    },
                    Some(Control::Shutdown) | None => break,
                },
                Some(event) = inbox.recv() => self.internal(event),
            }

            // A terminated peer keeps answering requests but holds no
            // channels, timers or address.
            if !released && self.peer.role() == RoleKind::Terminated {
                self.stop();
                released = true;
            }
        }
        if !released {
            self.stop();
        }
    }

    fn dispatch(&mut self, event: PeerEvent) -> Result<(), SessionError> {
        let actions = self.peer.handle(event)?;
        self.execute(actions);
        Ok(())
    }

    fn internal(&mut self, event: Internal<T::Sender, T::Receiver>) {
        let event = match event {
            Internal::Accepted(channel) => {
                let (channel, remote) = self.open(channel);
                PeerEvent::Accepted { channel, remote }
            },
            Internal::Connected(channel) => {
                let (channel, remote) = self.open(channel);
                PeerEvent::Connected { channel, remote }
            },
            Internal::ConnectFailed { remote, error } => PeerEvent::ConnectFailed { remote, error },
            // Channels closed locally are already forgotten.
            Internal::Received { channel, frame } => {
                if !self.senders.contains_key(&channel) {
                    return;
                }
                PeerEvent::Received { channel, frame }
            },
            Internal::Closed(channel) => {
                if self.senders.remove(&channel).is_none() {
                    return;
                }
                self.readers.remove(&channel);
                PeerEvent::Closed { channel }
            },
            Internal::TimerFired { timer, generation } => {
                match self.timers.get(&timer) {
                    Some((armed, _)) if *armed == generation => {
                        self.timers.remove(&timer);
                    },
                    _ => return,
                }
                PeerEvent::TimerFired(timer)
            },
        };

        if let Err(error) = self.dispatch(event) {
            warn!(%error, "event rejected");
        }
    }

    /// Register a new channel and start reading from it.
    fn open(&mut self, channel: Channel<T::Sender, T::Receiver>) -> (ChannelId, PeerAddr) {
        self.next_channel += 1;
        let id = ChannelId(self.next_channel);
        let Channel { remote, sender, mut receiver } = channel;

        let events = self.events.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                if events.send(Internal::Received { channel: id, frame }).is_err() {
                    return;
                }
            }
            let _ = events.send(Internal::Closed(id));
        });

        debug!(channel = %id, %remote, "channel open");
        self.senders.insert(id, sender);
        self.readers.insert(id, reader);
        (id, remote)
    }

    fn execute(&mut self, actions: Vec<PeerAction>) {
        for action in actions {
            match action {
                PeerAction::Send { channel, frame } => match self.senders.get(&channel) {
                    Some(sender) => {
                        if let Err(error) = sender.send(frame) {
                            debug!(%channel, %error, "send failed");
                        }
                    },
                    None => debug!(%channel, "send on closed channel"),
                },
                PeerAction::Close { channel } => {
                    if let Some(sender) = self.senders.remove(&channel) {
                        sender.close();
                    }
                    if let Some(reader) = self.readers.remove(&channel) {
                        reader.abort();
                    }
                },
                PeerAction::Connect { remote } => self.connect(remote),
                PeerAction::Listen => self.listen(),
                PeerAction::StartTimer { timer, after } => self.start_timer(timer, after),
                PeerAction::CancelTimer { timer } => {
                    if let Some((_, task)) = self.timers.remove(&timer) {
                        task.abort();
                    }
                },
                PeerAction::Present(event) => event.dispatch(self.presentation.as_mut()),
            }
        }
    }

    fn connect(&self, remote: PeerAddr) {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let local = self.address.clone();

        tokio::spawn(async move {
            let event = match transport.connect(&local, &remote).await {
                Ok(channel) => Internal::Connected(channel),
                Err(error) => Internal::ConnectFailed { remote, error },
            };
            let _ = events.send(event);
        });
    }

    fn listen(&mut self) {
        let Some(mut listener) = self.listener.take() else {
            warn!("no bound address to accept on");
            return;
        };

        let events = self.events.clone();
        self.acceptor = Some(tokio::spawn(async move {
            while let Some(channel) = listener.accept().await {
                if events.send(Internal::Accepted(channel)).is_err() {
                    return;
                }
            }
        }));
        info!(addr = %self.address, "accepting channels");
    }

    fn start_timer(&mut self, timer: Timer, after: Duration) {
        self.next_timer += 1;
        let generation = self.next_timer;
        let env = self.env.clone();
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            env.sleep(after).await;
            let _ = events.send(Internal::TimerFired { timer, generation });
        });
        if let Some((_, replaced)) = self.timers.insert(timer, (generation, task)) {
            replaced.abort();
        }
    }

    fn stop(&mut self) {
        for (_, sender) in self.senders.drain() {
            sender.close();
        }
        for (_, reader) in self.readers.drain() {
            reader.abort();
        }
        for (_, (_, timer)) in self.timers.drain() {
            timer.abort();
        }
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        self.listener = None;
        info!("session stopped");
    }
}
