//! World state for scenario execution.
//!
//! The World is a synchronous, deterministic stand-in for the async runtime.
//! It runs many peers, carries out their actions over an in-memory fabric and
//! delivers events from a single FIFO queue on a virtual clock. The same
//! seed always produces the same run.
//!
//! Channel semantics match the in-process transport: frames arrive in order,
//! frames queued before a close are still delivered, and closing a channel
//! only notifies the other end. A peer that has not started listening keeps
//! incoming channels in a backlog until it does.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use tandem_core::{
    ChannelId, Command, ContentProvider, Peer, PeerAction, PeerEvent, ProtocolConfig, RoleKind,
    RoomCode, SessionError, Timer, TransportError, room::personal_address,
};
use tandem_proto::{GameState, ParticipantId, PeerAddr};
use tracing::{debug, warn};

use crate::{
    content::{SAMPLE_CATEGORY, SampleContent},
    presentation::RecordingPresentation,
    sim_env::SimEnv,
};

/// Upper bound on events processed by one [`World::run_until_idle`].
const MAX_STEPS: usize = 100_000;

/// Upper bound on timers fired by one [`World::settle`].
const MAX_TIMERS: usize = 10_000;

struct Actor {
    peer: Peer<SimEnv>,
    address: PeerAddr,
    presentation: RecordingPresentation,
    listening: bool,
    crashed: bool,
    next_channel: u64,
    backlog: Vec<Pending>,
}

/// An incoming channel not yet accepted.
struct Pending {
    channel: ChannelId,
    remote: PeerAddr,
    frames: Vec<Bytes>,
    closed: bool,
}

#[derive(Debug, Clone)]
struct Endpoint {
    actor: String,
    channel: ChannelId,
}

struct Armed {
    due: Duration,
    seq: u64,
    actor: String,
    timer: Timer,
}

/// World state containing all peers and the fabric between them.
pub struct World {
    env: SimEnv,
    config: ProtocolConfig,
    content: Arc<dyn ContentProvider>,
    category: String,
    actors: BTreeMap<String, Actor>,
    bindings: HashMap<PeerAddr, String>,
    links: HashMap<(String, ChannelId), Endpoint>,
    closed_locally: HashSet<(String, ChannelId)>,
    queue: VecDeque<(String, PeerEvent)>,
    timers: Vec<Armed>,
    next_seq: u64,
    rejected: Vec<(String, SessionError)>,
    frames_sent: HashMap<String, usize>,
    frames_received: HashMap<String, usize>,
}

impl World {
    /// World with default configuration and [`SampleContent`].
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, ProtocolConfig::default())
    }

    /// World with custom configuration and [`SampleContent`].
    pub fn with_config(seed: u64, config: ProtocolConfig) -> Self {
        Self::with_content(seed, config, Arc::new(SampleContent::new()), SAMPLE_CATEGORY)
    }

    /// World with custom configuration and content. Rooms start in `category`.
    pub fn with_content(
        seed: u64,
        config: ProtocolConfig,
        content: Arc<dyn ContentProvider>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            env: SimEnv::with_virtual_clock(seed),
            config,
            content,
            category: category.into(),
            actors: BTreeMap::new(),
            bindings: HashMap::new(),
            links: HashMap::new(),
            closed_locally: HashSet::new(),
            queue: VecDeque::new(),
            timers: Vec::new(),
            next_seq: 0,
            rejected: Vec::new(),
            frames_sent: HashMap::new(),
            frames_received: HashMap::new(),
        }
    }

    /// Virtual time since the world was created.
    pub fn now(&self) -> Duration {
        self.env.elapsed()
    }

    /// Open a room hosted by a new peer called `name`.
    ///
    /// Names identify actors in the world and must be unique; a taken name
    /// fails with [`SessionError::AddressTaken`] for the existing peer.
    pub fn host(&mut self, name: &str) -> Result<PeerAddr, SessionError> {
        self.check_name(name)?;
        let mut tried = Vec::new();
        let address = loop {
            let code = RoomCode::generate_excluding(&self.env, &tried);
            let address = code.to_address();
            if !self.bindings.contains_key(&address) {
                break address;
            }
            tried.push(code);
        };

        let (peer, actions) = Peer::host(
            self.env.clone(),
            self.config.clone(),
            Arc::clone(&self.content),
            address.clone(),
            name,
            &self.category,
        )?;
        self.insert(name, peer, address.clone(), true);
        self.execute(name, actions);
        Ok(address)
    }

    /// Add a peer called `name` that joins the room at `room`.
    ///
    /// The first channel is opened synchronously, so an unknown or crashed
    /// room fails here with [`SessionError::Unreachable`].
    pub fn join(&mut self, name: &str, room: &PeerAddr) -> Result<PeerAddr, SessionError> {
        self.check_name(name)?;
        let address = loop {
            let address = personal_address(&self.env);
            if !self.bindings.contains_key(&address) {
                break address;
            }
        };

        let peer = Peer::join(
            self.env.clone(),
            self.config.clone(),
            Arc::clone(&self.content),
            address.clone(),
            name,
            room.clone(),
        )?;
        let target = self.bound(room).ok_or_else(|| SessionError::Unreachable(room.clone()))?;

        self.insert(name, peer, address.clone(), false);
        let channel = self.open_link(name, &target);
        self.queue.push_back((name.to_owned(), PeerEvent::Connected { channel, remote: room.clone() }));
        Ok(address)
    }

    /// Issue a UI command on `name` and carry out its actions.
    pub fn command(&mut self, name: &str, command: Command) -> Result<(), SessionError> {
        let actor = self
            .actors
            .get_mut(name)
            .filter(|a| !a.crashed)
            .ok_or_else(|| SessionError::Unreachable(PeerAddr::new(name)))?;
        let actions = actor.peer.handle(PeerEvent::Command(command))?;
        self.execute(name, actions);
        Ok(())
    }

    /// Process queued events until none are left. Timers do not fire.
    ///
    /// Returns the number of events processed.
    pub fn run_until_idle(&mut self) -> usize {
        let mut steps = 0;
        while steps < MAX_STEPS && self.step() {
            steps += 1;
        }
        if steps == MAX_STEPS {
            warn!(steps, "event queue did not drain");
        }
        steps
    }

    /// Move the clock forward by `by`, firing every timer that falls due.
    pub fn advance(&mut self, by: Duration) {
        let deadline = self.now() + by;
        loop {
            self.run_until_idle();
            match self.earliest_timer().filter(|&i| self.timers[i].due <= deadline) {
                Some(index) => self.fire(index),
                None => break,
            }
        }
        let now = self.now();
        if deadline > now {
            self.env.advance(deadline - now);
        }
    }

    /// Run until the queue is empty and no timers are armed.
    pub fn settle(&mut self) {
        for _ in 0..MAX_TIMERS {
            self.run_until_idle();
            match self.earliest_timer() {
                Some(index) => self.fire(index),
                None => return,
            }
        }
        warn!("timers did not settle");
    }

    /// Drop `name` off the network: its address is released, every channel
    /// it holds closes, and it never runs again.
    pub fn crash(&mut self, name: &str) {
        let Some(actor) = self.actors.get_mut(name) else {
            return;
        };
        actor.crashed = true;
        debug!(actor = name, "crash");

        self.bindings.retain(|_, owner| owner != name);
        self.timers.retain(|t| t.actor != name);
        self.queue.retain(|(owner, _)| owner != name);

        let mut ends: Vec<(String, ChannelId)> =
            self.links.keys().filter(|(owner, _)| owner == name).cloned().collect();
        ends.sort_by_key(|(_, channel)| *channel);
        for end in ends {
            if let Some(far) = self.links.remove(&end) {
                self.links.remove(&(far.actor.clone(), far.channel));
                self.close_remote(far);
            }
        }
    }

    /// Peer called `name`, crashed or not.
    pub fn peer(&self, name: &str) -> Option<&Peer<SimEnv>> {
        self.actors.get(name).map(|a| &a.peer)
    }

    /// Presentation log of `name`.
    pub fn presentation(&self, name: &str) -> Option<&RecordingPresentation> {
        self.actors.get(name).map(|a| &a.presentation)
    }

    /// Bound address of `name`.
    pub fn address(&self, name: &str) -> Option<&PeerAddr> {
        self.actors.get(name).map(|a| &a.address)
    }

    /// Participant id of `name`.
    pub fn id(&self, name: &str) -> Option<ParticipantId> {
        self.peer(name).map(|p| p.id().clone())
    }

    /// State held by `name`: authoritative or mirrored.
    pub fn state(&self, name: &str) -> Option<&GameState> {
        self.peer(name).and_then(Peer::state)
    }

    /// True once `name` has crashed.
    pub fn is_crashed(&self, name: &str) -> bool {
        self.actors.get(name).is_some_and(|a| a.crashed)
    }

    /// Every actor name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.actors.keys().cloned().collect()
    }

    /// Peers that have not crashed, sorted by name.
    pub fn live(&self) -> impl Iterator<Item = (&str, &Peer<SimEnv>)> {
        self.actors.iter().filter(|(_, a)| !a.crashed).map(|(n, a)| (n.as_str(), &a.peer))
    }

    /// Live peers acting as coordinator.
    pub fn coordinators(&self) -> Vec<&str> {
        self.live().filter(|(_, p)| p.role() == RoleKind::Coordinator).map(|(n, _)| n).collect()
    }

    /// Actor whose participant id is `id`.
    pub fn name_of(&self, id: &ParticipantId) -> Option<&str> {
        self.actors.iter().find(|(_, a)| a.peer.id() == id).map(|(n, _)| n.as_str())
    }

    /// Events the protocol rejected while the world delivered them.
    pub fn rejected(&self) -> &[(String, SessionError)] {
        &self.rejected
    }

    /// Timers currently armed.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Frames sent by `name`.
    pub fn frames_sent(&self, name: &str) -> usize {
        self.frames_sent.get(name).copied().unwrap_or(0)
    }

    /// Frames delivered to `name`.
    pub fn frames_received(&self, name: &str) -> usize {
        self.frames_received.get(name).copied().unwrap_or(0)
    }

    fn check_name(&self, name: &str) -> Result<(), SessionError> {
        match self.actors.get(name) {
            Some(actor) => Err(SessionError::AddressTaken(actor.address.clone())),
            None => Ok(()),
        }
    }

    fn insert(&mut self, name: &str, peer: Peer<SimEnv>, address: PeerAddr, listening: bool) {
        self.bindings.insert(address.clone(), name.to_owned());
        self.actors.insert(name.to_owned(), Actor {
            peer,
            address,
            presentation: RecordingPresentation::new(),
            listening,
            crashed: false,
            next_channel: 0,
            backlog: Vec::new(),
        });
    }

    /// Live actor bound at `addr`.
    fn bound(&self, addr: &PeerAddr) -> Option<String> {
        self.bindings.get(addr).filter(|name| !self.is_crashed(name)).cloned()
    }

    fn channel_id(&mut self, name: &str) -> ChannelId {
        let actor = self.actors.get_mut(name);
        let next = actor.map_or(0, |a| {
            a.next_channel += 1;
            a.next_channel
        });
        ChannelId(next)
    }

    /// Open a channel from `dialer` to `target`. Returns the dialer's end.
    fn open_link(&mut self, dialer: &str, target: &str) -> ChannelId {
        let near = self.channel_id(dialer);
        let far = self.channel_id(target);
        self.links.insert((dialer.to_owned(), near), Endpoint { actor: target.to_owned(), channel: far });
        self.links.insert((target.to_owned(), far), Endpoint { actor: dialer.to_owned(), channel: near });

        let remote = self.actors.get(dialer).map(|a| a.address.clone());
        if let (Some(remote), Some(actor)) = (remote, self.actors.get_mut(target)) {
            if actor.listening {
                self.queue.push_back((target.to_owned(), PeerEvent::Accepted { channel: far, remote }));
            } else {
                actor.backlog.push(Pending { channel: far, remote, frames: Vec::new(), closed: false });
            }
        }
        near
    }

    /// Tell the far end of a channel that it closed.
    fn close_remote(&mut self, far: Endpoint) {
        let Some(actor) = self.actors.get_mut(&far.actor) else {
            return;
        };
        if actor.crashed {
            return;
        }
        if let Some(pending) = actor.backlog.iter_mut().find(|p| p.channel == far.channel) {
            pending.closed = true;
            return;
        }
        self.queue.push_back((far.actor, PeerEvent::Closed { channel: far.channel }));
    }

    fn step(&mut self) -> bool {
        let Some((name, event)) = self.queue.pop_front() else {
            return false;
        };
        let stale = match &event {
            PeerEvent::Received { channel, .. } | PeerEvent::Closed { channel } => {
                self.closed_locally.contains(&(name.clone(), *channel))
            },
            _ => false,
        };
        if stale {
            return true;
        }

        let Some(actor) = self.actors.get_mut(&name).filter(|a| !a.crashed) else {
            return true;
        };
        match actor.peer.handle(event) {
            Ok(actions) => self.execute(&name, actions),
            Err(error) => {
                debug!(actor = %name, %error, "event rejected");
                self.rejected.push((name, error));
            },
        }
        true
    }

    fn execute(&mut self, name: &str, actions: Vec<PeerAction>) {
        for action in actions {
            match action {
                PeerAction::Send { channel, frame } => self.deliver(name, channel, frame),
                PeerAction::Close { channel } => {
                    self.closed_locally.insert((name.to_owned(), channel));
                    if let Some(far) = self.links.remove(&(name.to_owned(), channel)) {
                        self.links.remove(&(far.actor.clone(), far.channel));
                        self.close_remote(far);
                    }
                },
                PeerAction::Connect { remote } => {
                    let event = match self.bound(&remote) {
                        Some(target) => {
                            let channel = self.open_link(name, &target);
                            PeerEvent::Connected { channel, remote }
                        },
                        None => PeerEvent::ConnectFailed {
                            error: TransportError::Unreachable(remote.clone()),
                            remote,
                        },
                    };
                    self.queue.push_back((name.to_owned(), event));
                },
                PeerAction::Listen => self.listen(name),
                PeerAction::StartTimer { timer, after } => {
                    self.timers.retain(|t| !(t.actor == name && t.timer == timer));
                    self.next_seq += 1;
                    self.timers.push(Armed {
                        due: self.now() + after,
                        seq: self.next_seq,
                        actor: name.to_owned(),
                        timer,
                    });
                },
                PeerAction::CancelTimer { timer } => {
                    self.timers.retain(|t| !(t.actor == name && t.timer == timer));
                },
                PeerAction::Present(event) => {
                    if let Some(actor) = self.actors.get(name) {
                        actor.presentation.record(event);
                    }
                },
            }
        }
    }

    fn deliver(&mut self, name: &str, channel: ChannelId, frame: Bytes) {
        let Some(far) = self.links.get(&(name.to_owned(), channel)).cloned() else {
            return;
        };
        *self.frames_sent.entry(name.to_owned()).or_insert(0) += 1;

        let Some(actor) = self.actors.get_mut(&far.actor).filter(|a| !a.crashed) else {
            return;
        };
        if let Some(pending) = actor.backlog.iter_mut().find(|p| p.channel == far.channel) {
            pending.frames.push(frame);
            return;
        }
        *self.frames_received.entry(far.actor.clone()).or_insert(0) += 1;
        self.queue.push_back((far.actor, PeerEvent::Received { channel: far.channel, frame }));
    }

    fn listen(&mut self, name: &str) {
        let Some(actor) = self.actors.get_mut(name) else {
            return;
        };
        actor.listening = true;
        let backlog = std::mem::take(&mut actor.backlog);

        for pending in backlog {
            let channel = pending.channel;
            self.queue.push_back((name.to_owned(), PeerEvent::Accepted {
                channel,
                remote: pending.remote,
            }));
            for frame in pending.frames {
                *self.frames_received.entry(name.to_owned()).or_insert(0) += 1;
                self.queue.push_back((name.to_owned(), PeerEvent::Received { channel, frame }));
            }
            if pending.closed {
                self.queue.push_back((name.to_owned(), PeerEvent::Closed { channel }));
            }
        }
    }

    fn earliest_timer(&self) -> Option<usize> {
        self.timers.iter().enumerate().min_by_key(|(_, t)| (t.due, t.seq)).map(|(i, _)| i)
    }

    fn fire(&mut self, index: usize) {
        let armed = self.timers.remove(index);
        let now = self.now();
        if armed.due > now {
            self.env.advance(armed.due - now);
        }
        self.queue.push_back((armed.actor, PeerEvent::TimerFired(armed.timer)));
    }
}
