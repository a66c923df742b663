use zookeeper::WatchedEvent;
use zookeeper::WatchedEventType;
use zookeeper::ZkState;


/// Session connection state, mirroring `zookeeper::ZkState` with the deprecated
/// variants folded away.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum SessionState {
    Associating,
    AuthFailed,
    Connecting,
    Connected,
    Expired,
}

impl From<ZkState> for SessionState {
    fn from(state: ZkState) -> SessionState {
        match state {
            ZkState::Associating => SessionState::Associating,
            ZkState::AuthFailed => SessionState::AuthFailed,
            ZkState::Connecting => SessionState::Connecting,
            ZkState::Connected | ZkState::ConnectedReadOnly => SessionState::Connected,
            ZkState::Closed => SessionState::Expired,
            ZkState::NotConnected => SessionState::Connecting,
        }
    }
}

/// Kind of event delivered to a watcher observer.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum EventType {
    Created,
    Deleted,
    Changed,
    Child,
    NotWatching,
    Session,
}

impl From<WatchedEventType> for EventType {
    fn from(kind: WatchedEventType) -> EventType {
        match kind {
            WatchedEventType::NodeCreated => EventType::Created,
            WatchedEventType::NodeDeleted => EventType::Deleted,
            WatchedEventType::NodeDataChanged => EventType::Changed,
            WatchedEventType::NodeChildrenChanged => EventType::Child,
            WatchedEventType::None => EventType::Session,
            #[allow(deprecated)]
            WatchedEventType::DataWatchRemoved | WatchedEventType::ChildWatchRemoved => {
                EventType::NotWatching
            }
        }
    }
}

/// A single node or session event, adapted from the raw `zookeeper` callback shapes.
#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventType,
    pub path: Option<String>,
    pub state: SessionState,
}

impl From<WatchedEvent> for Event {
    fn from(raw: WatchedEvent) -> Event {
        Event {
            kind: EventType::from(raw.event_type),
            path: raw.path,
            state: SessionState::from(raw.keeper_state),
        }
    }
}

impl Event {
    /// Build a synthetic `NotWatching` event for a watcher that gave up retrying.
    pub fn not_watching(path: &str) -> Event {
        Event {
            kind: EventType::NotWatching,
            path: Some(path.to_string()),
            state: SessionState::Connected,
        }
    }

    /// Build a synthetic session-only event (no associated node path).
    pub fn session(state: SessionState) -> Event {
        Event {
            kind: EventType::Session,
            path: None,
            state,
        }
    }
}
