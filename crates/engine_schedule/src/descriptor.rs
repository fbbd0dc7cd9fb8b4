//! System descriptors — what a system declares about itself.
//!
//! A [`SystemDescriptor`] bundles a system's name, its component access, its
//! ordering hints (sequence tag, priority), its owning module, and the body
//! the executor calls once per tick.

use std::fmt;
use std::sync::Arc;

use engine_component::{AccessDescriptor, ComponentTypeId, fnv1a_64};
use serde::{Deserialize, Serialize};

/// Identifier of a registered system.
///
/// Ids are assigned by the descriptor table unless the caller picks one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(pub u64);

impl SystemId {
    /// Sentinel for "let the table assign an id".
    pub const UNASSIGNED: SystemId = SystemId(0);

    /// Returns `true` unless this is [`SystemId::UNASSIGNED`].
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "System({})", self.0)
    }
}

/// Identifier of the module (plugin, game mod) that owns a set of systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

impl ModuleId {
    /// Derive a module id from the module's name.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a_64(name))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module({:#018x})", self.0)
    }
}

/// An ordering label, e.g. "physics" or "render".
///
/// Tags group systems; a [`TagOrder`](crate::tag::TagOrder) says which groups
/// must run before which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceTag(pub u64);

impl SequenceTag {
    /// Derive a tag from its name.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a_64(name))
    }
}

impl fmt::Display for SequenceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:#018x})", self.0)
    }
}

/// Per-tick data handed to every system body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// Monotonically increasing tick counter.
    pub tick_id: u64,
    /// Simulated time for this tick, in seconds.
    pub dt: f64,
}

impl TickContext {
    /// Create a context for a tick.
    #[must_use]
    pub const fn new(tick_id: u64, dt: f64) -> Self {
        Self { tick_id, dt }
    }
}

/// The callable part of a system.
///
/// Bodies run on worker threads, possibly concurrently with other systems
/// of the same wave, hence `Send + Sync`. Any closure
/// `Fn(&TickContext) -> anyhow::Result<()>` is a body.
pub trait SystemBody: Send + Sync + 'static {
    /// Run the system once.
    ///
    /// # Errors
    ///
    /// Whatever the system reports; the executor records it against this
    /// system without touching its wave siblings.
    fn run(&self, ctx: &TickContext) -> anyhow::Result<()>;
}

impl<F> SystemBody for F
where
    F: Fn(&TickContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn run(&self, ctx: &TickContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// Shared handle to a system body.
#[derive(Clone)]
pub struct SystemFn(Arc<dyn SystemBody>);

impl SystemFn {
    /// Wrap a body.
    pub fn new(body: impl SystemBody) -> Self {
        Self(Arc::new(body))
    }

    /// Run the wrapped body.
    ///
    /// # Errors
    ///
    /// Propagates the body's error.
    pub fn run(&self, ctx: &TickContext) -> anyhow::Result<()> {
        self.0.run(ctx)
    }
}

impl fmt::Debug for SystemFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SystemFn(..)")
    }
}

/// How a system touches entity storage itself (as opposed to component
/// data). Every system reads it; adding or removing entities writes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityAccess {
    #[default]
    Read,
    Write,
}

/// Everything the scheduler knows about one system.
///
/// Built with the `with_*`/builder methods and handed to
/// [`DescriptorTable::register`](crate::table::DescriptorTable::register).
/// Once registered a descriptor is never mutated.
#[derive(Debug, Clone)]
pub struct SystemDescriptor {
    pub(crate) id: SystemId,
    name: String,
    access: AccessDescriptor,
    tag: Option<SequenceTag>,
    priority: i32,
    owner: Option<ModuleId>,
    exclusive: bool,
    main_thread: bool,
    entity_access: EntityAccess,
    /// Sorted tags this system must never share a wave with.
    not_during: Vec<SequenceTag>,
    body: SystemFn,
}

impl SystemDescriptor {
    /// Create a descriptor with no declared access, no tag, priority 0.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&TickContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_body(name, body)
    }

    /// Like [`SystemDescriptor::new`], for bodies that are not closures.
    pub fn from_body(name: impl Into<String>, body: impl SystemBody) -> Self {
        Self {
            id: SystemId::UNASSIGNED,
            name: name.into(),
            access: AccessDescriptor::new(),
            tag: None,
            priority: 0,
            owner: None,
            exclusive: false,
            main_thread: false,
            entity_access: EntityAccess::Read,
            not_during: Vec::new(),
            body: SystemFn::new(body),
        }
    }

    /// Request a specific id instead of an assigned one.
    #[must_use]
    pub fn with_id(mut self, id: SystemId) -> Self {
        self.id = id;
        self
    }

    /// Declare a read of `type_id`.
    #[must_use]
    pub fn reads(mut self, type_id: ComponentTypeId) -> Self {
        self.access.add_read(type_id);
        self
    }

    /// Declare a write of `type_id`.
    #[must_use]
    pub fn writes(mut self, type_id: ComponentTypeId) -> Self {
        self.access.add_write(type_id);
        self
    }

    /// Declare a write of the synthetic resource `name`.
    #[must_use]
    pub fn uses_resource(self, name: &str) -> Self {
        self.writes(ComponentTypeId::resource(name))
    }

    /// Replace the whole access declaration.
    #[must_use]
    pub fn with_access(mut self, access: AccessDescriptor) -> Self {
        self.access = access;
        self
    }

    /// Put the system in a sequence tag group.
    #[must_use]
    pub fn with_tag(mut self, tag: SequenceTag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Set the priority. Higher priority runs earlier when two systems
    /// conflict on data.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the system as owned by `module`.
    #[must_use]
    pub fn with_owner(mut self, module: ModuleId) -> Self {
        self.owner = Some(module);
        self
    }

    /// Require a wave of its own.
    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Always run on the coordinating thread.
    #[must_use]
    pub fn main_thread(mut self) -> Self {
        self.main_thread = true;
        self
    }

    /// Declare that the system adds or removes entities. This writes entity
    /// storage, which every other system reads.
    #[must_use]
    pub fn structural(mut self) -> Self {
        self.entity_access = EntityAccess::Write;
        self
    }

    /// Never run in the same wave as a system tagged `tag`. Mutual: either
    /// side may go first.
    #[must_use]
    pub fn not_during(mut self, tag: SequenceTag) -> Self {
        if let Err(pos) = self.not_during.binary_search(&tag) {
            self.not_during.insert(pos, tag);
        }
        self
    }

    /// The system id ([`SystemId::UNASSIGNED`] before registration).
    #[must_use]
    pub fn id(&self) -> SystemId {
        self.id
    }

    /// The human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared component access.
    #[must_use]
    pub fn access(&self) -> &AccessDescriptor {
        &self.access
    }

    /// Sequence tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<SequenceTag> {
        self.tag
    }

    /// Priority (default 0).
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Owning module, if any.
    #[must_use]
    pub fn owner(&self) -> Option<ModuleId> {
        self.owner
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    #[must_use]
    pub fn is_main_thread(&self) -> bool {
        self.main_thread
    }

    #[must_use]
    pub fn entity_access(&self) -> EntityAccess {
        self.entity_access
    }

    /// Tags this system excludes from its wave, sorted.
    #[must_use]
    pub fn excluded_tags(&self) -> &[SequenceTag] {
        &self.not_during
    }

    /// Returns `true` if either side declared `not_during` the other's tag.
    #[must_use]
    pub fn excludes(&self, other: &SystemDescriptor) -> bool {
        let blocks = |a: &Self, b: &Self| {
            b.tag.is_some_and(|tag| a.not_during.binary_search(&tag).is_ok())
        };
        blocks(self, other) || blocks(other, self)
    }

    /// The callable body.
    #[must_use]
    pub fn body(&self) -> &SystemFn {
        &self.body
    }
}
