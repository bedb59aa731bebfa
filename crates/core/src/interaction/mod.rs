//! Station surfaces: slot rules, crafting transactions and the loop they run on.

pub mod layout;
mod machine;
mod player;
mod scheduler;
mod surface;

pub use machine::{ClickKind, Decision, InteractionMachine};
pub use player::{HeadlessPlayer, Inventory, Notice, Player, PlayerId, STORAGE_SLOTS};
pub use scheduler::{LoopHandle, Task, TaskQueue};
pub use surface::{Surface, SurfaceDescriptor, SurfaceId, SurfaceMode};

use crate::provider::SyncProvider;

/// The interaction loop: one machine plus the queue that feeds it.
///
/// Everything that touches surfaces or inventories runs through [`tick`] or
/// [`run_next`], so only one context ever mutates live state.
///
/// [`tick`]: InteractionLoop::tick
/// [`run_next`]: InteractionLoop::run_next
pub struct InteractionLoop<P: Player> {
    machine: InteractionMachine<P>,
    queue: TaskQueue<InteractionMachine<P>>,
}

impl<P: Player> InteractionLoop<P> {
    /// Loop crafting against `provider`'s cache.
    pub fn new(provider: SyncProvider, default_type: &str) -> Self {
        let queue = TaskQueue::new();
        let machine = InteractionMachine::new(provider, default_type, queue.handle());
        Self { machine, queue }
    }

    /// The machine, for event dispatch on the loop.
    pub fn machine(&self) -> &InteractionMachine<P> {
        &self.machine
    }

    /// Mutable machine.
    pub fn machine_mut(&mut self) -> &mut InteractionMachine<P> {
        &mut self.machine
    }

    /// Handle for scheduling work onto this loop from elsewhere.
    pub fn handle(&self) -> LoopHandle<InteractionMachine<P>> {
        self.queue.handle()
    }

    /// Run one tick: every task queued before the call.
    pub fn tick(&mut self) -> usize {
        self.queue.run_tick(&mut self.machine)
    }

    /// Wait for the next task (e.g. a save completion) and run it.
    pub async fn run_next(&mut self) -> bool {
        self.queue.run_next(&mut self.machine).await
    }
}
