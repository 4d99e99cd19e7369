//! In-process model of the kernel key facility.
//!
//! Keys live in a database indexed by serial; keyrings hold ordered link
//! lists. Expiry is absolute and evaluated lazily against a clock that tests
//! can skew forward, the way the kernel leaves expired keys linked until they
//! are unlinked or garbage-collected.

use super::backend::{encode_serials, KeyBackend, KeySerial, KeyType, SpecialKeyring};
use nix::errno::Errno;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

/// Kernel default permissions: possessor all, user view.
const DEFAULT_PERM: u32 = 0x3f01_0000;

#[derive(Debug)]
struct Node {
    key_type: KeyType,
    description: String,
    payload: Vec<u8>,
    links: Vec<KeySerial>,
    expires_at: Option<SystemTime>,
    revoked: bool,
}

impl Node {
    fn new(key_type: KeyType, description: &str, payload: &[u8]) -> Self {
        Self {
            key_type,
            description: description.to_string(),
            payload: payload.to_vec(),
            links: Vec::new(),
            expires_at: None,
            revoked: false,
        }
    }

    /// Errno a live-object lookup reports for this node at `now`.
    fn dead_errno(&self, now: SystemTime) -> Option<Errno> {
        if self.revoked {
            return Some(Errno::EKEYREVOKED);
        }
        match self.expires_at {
            Some(at) if at <= now => Some(Errno::EKEYEXPIRED),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct MemoryState {
    nodes: BTreeMap<KeySerial, Node>,
    next_serial: KeySerial,
    root: KeySerial,
    persistent: BTreeMap<u32, KeySerial>,
    skew: Duration,
}

impl MemoryState {
    fn now(&self) -> SystemTime {
        SystemTime::now() + self.skew
    }

    fn alloc(&mut self, node: Node) -> KeySerial {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.nodes.insert(serial, node);
        serial
    }

    fn live(&self, serial: KeySerial) -> Result<&Node, Errno> {
        let node = self.nodes.get(&serial).ok_or(Errno::ENOKEY)?;
        match node.dead_errno(self.now()) {
            Some(errno) => Err(errno),
            None => Ok(node),
        }
    }

    fn live_keyring(&self, serial: KeySerial) -> Result<&Node, Errno> {
        let node = self.live(serial)?;
        if node.key_type != KeyType::Keyring {
            return Err(Errno::ENOTDIR);
        }
        Ok(node)
    }

    fn keyring_mut(&mut self, serial: KeySerial) -> Result<&mut Node, Errno> {
        self.live_keyring(serial)?;
        self.nodes.get_mut(&serial).ok_or(Errno::ENOKEY)
    }

    /// Direct child of `keyring` matching type and description, dead or alive.
    fn find_child(&self, keyring: KeySerial, key_type: KeyType, description: &str) -> Option<KeySerial> {
        let parent = self.nodes.get(&keyring)?;
        parent.links.iter().copied().find(|serial| {
            self.nodes
                .get(serial)
                .is_some_and(|n| n.key_type == key_type && n.description == description)
        })
    }

    /// Keys charged against the quota: everything still linked below an
    /// anchor. Unlinked keys are garbage and no longer count.
    fn user_key_count(&self) -> usize {
        let anchors: Vec<KeySerial> = self
            .persistent
            .values()
            .copied()
            .chain(std::iter::once(self.root))
            .collect();
        let mut seen: HashSet<KeySerial> = anchors.iter().copied().collect();
        let mut queue: VecDeque<KeySerial> = anchors.into_iter().collect();
        let mut count = 0;
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(&current) else { continue };
            for child in &node.links {
                if seen.insert(*child) {
                    count += 1;
                    queue.push_back(*child);
                }
            }
        }
        count
    }

    fn search_from(&self, keyring: KeySerial, key_type: KeyType, description: &str) -> Result<KeySerial, Errno> {
        self.live_keyring(keyring)?;
        let now = self.now();
        let mut dead = None;
        let mut seen = HashSet::from([keyring]);
        let mut queue = VecDeque::from([keyring]);
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(&current) else { continue };
            for child in &node.links {
                let Some(child_node) = self.nodes.get(child) else { continue };
                let state = child_node.dead_errno(now);
                if child_node.key_type == key_type && child_node.description == description {
                    match state {
                        None => return Ok(*child),
                        Some(errno) => dead = dead.or(Some(errno)),
                    }
                }
                if child_node.key_type == KeyType::Keyring && state.is_none() && seen.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }
        Err(dead.unwrap_or(Errno::ENOKEY))
    }
}

#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    quota: Option<usize>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut state = MemoryState {
            nodes: BTreeMap::new(),
            next_serial: 1000,
            root: 0,
            persistent: BTreeMap::new(),
            skew: Duration::ZERO,
        };
        state.root = state.alloc(Node::new(KeyType::Keyring, "_ses", &[]));
        Self {
            state: Mutex::new(state),
            quota: None,
        }
    }

    /// Limit the number of keys that may exist below the anchors.
    pub fn with_quota(mut self, max_keys: usize) -> Self {
        self.quota = Some(max_keys);
        self
    }

    /// Move the facility clock forward; expired keys become unreadable.
    pub fn advance(&self, by: Duration) {
        self.lock().skew += by;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyBackend for MemoryBackend {
    fn add_key(
        &self,
        key_type: KeyType,
        description: &str,
        payload: &[u8],
        keyring: KeySerial,
    ) -> Result<KeySerial, Errno> {
        if description.is_empty() {
            return Err(Errno::EINVAL);
        }
        match key_type {
            KeyType::Keyring if !payload.is_empty() => return Err(Errno::EINVAL),
            kind if kind.max_payload().is_some_and(|max| payload.len() > max) => return Err(Errno::EINVAL),
            _ => {}
        }

        let mut state = self.lock();
        state.live_keyring(keyring)?;
        let now = state.now();

        if let Some(existing) = state.find_child(keyring, key_type, description) {
            let dead = state.nodes.get(&existing).and_then(|n| n.dead_errno(now));
            match (key_type, dead) {
                (KeyType::Keyring, None) => return Err(Errno::EEXIST),
                (_, None) => {
                    if let Some(node) = state.nodes.get_mut(&existing) {
                        node.payload = payload.to_vec();
                    }
                    return Ok(existing);
                }
                (_, Some(_)) => {
                    state.keyring_mut(keyring)?.links.retain(|s| *s != existing);
                }
            }
        }

        if let Some(max) = self.quota {
            if state.user_key_count() >= max {
                return Err(Errno::EDQUOT);
            }
        }

        let serial = state.alloc(Node::new(key_type, description, payload));
        state.keyring_mut(keyring)?.links.push(serial);
        Ok(serial)
    }

    fn search(
        &self,
        keyring: KeySerial,
        key_type: KeyType,
        description: &str,
    ) -> Result<KeySerial, Errno> {
        self.lock().search_from(keyring, key_type, description)
    }

    fn request_key(&self, key_type: KeyType, description: &str) -> Result<KeySerial, Errno> {
        let state = self.lock();
        let mut anchors = vec![state.root];
        anchors.extend(state.persistent.values().copied());
        let mut result = Err(Errno::ENOKEY);
        for anchor in anchors {
            match state.search_from(anchor, key_type, description) {
                Ok(serial) => return Ok(serial),
                Err(Errno::ENOKEY) => {}
                Err(errno) => result = Err(errno),
            }
        }
        result
    }

    fn describe(&self, serial: KeySerial) -> Result<String, Errno> {
        let state = self.lock();
        let node = state.live(serial)?;
        Ok(format!(
            "{};0;0;{:08x};{}",
            node.key_type, DEFAULT_PERM, node.description
        ))
    }

    fn read(&self, serial: KeySerial) -> Result<Vec<u8>, Errno> {
        let state = self.lock();
        let node = state.live(serial)?;
        match node.key_type {
            KeyType::Keyring => Ok(encode_serials(&node.links)),
            KeyType::Logon => Err(Errno::EOPNOTSUPP),
            KeyType::User | KeyType::BigKey => Ok(node.payload.clone()),
        }
    }

    fn payload_len(&self, serial: KeySerial) -> Result<usize, Errno> {
        let state = self.lock();
        let node = state.live(serial)?;
        match node.key_type {
            KeyType::Keyring => Ok(node.links.len() * std::mem::size_of::<KeySerial>()),
            KeyType::Logon => Err(Errno::EOPNOTSUPP),
            KeyType::User | KeyType::BigKey => Ok(node.payload.len()),
        }
    }

    fn expiry(&self, serial: KeySerial) -> Result<Option<Duration>, Errno> {
        let state = self.lock();
        let node = state.nodes.get(&serial).ok_or(Errno::ENOKEY)?;
        let now = state.now();
        Ok(node
            .expires_at
            .map(|at| at.duration_since(now).unwrap_or(Duration::ZERO)))
    }

    fn set_timeout(&self, serial: KeySerial, seconds: u32) -> Result<(), Errno> {
        let mut state = self.lock();
        state.live(serial)?;
        let expires_at = match seconds {
            0 => None,
            secs => Some(state.now() + Duration::from_secs(u64::from(secs))),
        };
        if let Some(node) = state.nodes.get_mut(&serial) {
            node.expires_at = expires_at;
        }
        Ok(())
    }

    fn revoke(&self, serial: KeySerial) -> Result<(), Errno> {
        let mut state = self.lock();
        state.live(serial)?;
        if let Some(node) = state.nodes.get_mut(&serial) {
            node.revoked = true;
        }
        Ok(())
    }

    fn invalidate(&self, serial: KeySerial) -> Result<(), Errno> {
        let mut state = self.lock();
        if state.nodes.remove(&serial).is_none() {
            return Err(Errno::ENOKEY);
        }
        for node in state.nodes.values_mut() {
            node.links.retain(|s| *s != serial);
        }
        state.persistent.retain(|_, s| *s != serial);
        Ok(())
    }

    fn clear(&self, keyring: KeySerial) -> Result<(), Errno> {
        self.lock().keyring_mut(keyring)?.links.clear();
        Ok(())
    }

    fn link(&self, serial: KeySerial, keyring: KeySerial) -> Result<(), Errno> {
        let mut state = self.lock();
        let (key_type, description) = {
            let node = state.live(serial)?;
            (node.key_type, node.description.clone())
        };
        state.live_keyring(keyring)?;
        if serial == keyring {
            return Err(Errno::EDEADLK);
        }
        // A link displaces any sibling with the same type and description.
        let displaced = state.find_child(keyring, key_type, &description);
        let parent = state.keyring_mut(keyring)?;
        if let Some(old) = displaced {
            parent.links.retain(|s| *s != old);
        }
        parent.links.push(serial);
        Ok(())
    }

    fn unlink(&self, serial: KeySerial, keyring: KeySerial) -> Result<(), Errno> {
        let mut state = self.lock();
        let parent = state.keyring_mut(keyring)?;
        let before = parent.links.len();
        parent.links.retain(|s| *s != serial);
        if parent.links.len() == before {
            return Err(Errno::ENOENT);
        }
        Ok(())
    }

    fn persistent_keyring(&self, uid: Option<u32>) -> Result<KeySerial, Errno> {
        let uid = uid.unwrap_or_else(|| nix::unistd::geteuid().as_raw());
        let mut state = self.lock();
        if let Some(serial) = state.persistent.get(&uid) {
            return Ok(*serial);
        }
        let serial = state.alloc(Node::new(
            KeyType::Keyring,
            &format!("_persistent.{}", uid),
            &[],
        ));
        state.persistent.insert(uid, serial);
        Ok(serial)
    }

    fn special_keyring(&self, _id: SpecialKeyring, _create: bool) -> Result<KeySerial, Errno> {
        Ok(self.lock().root)
    }
}
