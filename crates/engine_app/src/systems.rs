//! Demo systems.
//!
//! A small simulation wired the way a game would wire it: an input system
//! pinned to the main thread, physics, regeneration, a frame counter
//! resource, and a render module that can be unloaded as a unit.
//!
//! ```text
//! input ──► integrate ──► render
//!                 regen ──┘
//! frame_counter (resource, independent)
//! ```

use std::sync::Arc;

use engine_component::TypeRegistry;
use engine_schedule::{
    ModuleId, Scheduler, SequenceTag, SystemDescriptor, SystemId, TagOrder, TickContext,
};
use tracing::{debug, trace};

use crate::world::{FRAME_COUNTER, Health, Position, Velocity, World};

pub const INPUT: SequenceTag = SequenceTag::from_name("input");
pub const PHYSICS: SequenceTag = SequenceTag::from_name("physics");
pub const RENDER: SequenceTag = SequenceTag::from_name("render");

/// Owner of the render systems.
pub const RENDER_MODULE: ModuleId = ModuleId::from_name("demo/render");

const DRAG: f64 = 0.99;
const REGEN_PER_SECOND: f64 = 2.0;

/// `input` before `physics` before `render`.
#[must_use]
pub fn tag_order() -> TagOrder {
    TagOrder::chain(&[INPUT, PHYSICS, RENDER])
}

/// Wrap a body so it fails when its system is named by `--fail-system`.
fn guarded<F>(
    name: &'static str,
    fail: Option<&str>,
    body: F,
) -> impl Fn(&TickContext) -> anyhow::Result<()> + Send + Sync + 'static
where
    F: Fn(&TickContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let inject = fail == Some(name);
    move |ctx: &TickContext| {
        anyhow::ensure!(!inject, "injected failure in `{name}` at tick {}", ctx.tick_id);
        body(ctx)
    }
}

/// Register the component types and the demo systems.
///
/// Returns the ids of the registered systems, in registration order.
///
/// # Errors
///
/// Fails on a component name collision or a duplicate system id.
pub fn register_demo(
    scheduler: &mut Scheduler,
    types: &TypeRegistry,
    world: &Arc<World>,
    fail: Option<&str>,
) -> anyhow::Result<Vec<SystemId>> {
    let position = types.register::<Position>()?;
    let velocity = types.register::<Velocity>()?;
    let health = types.register::<Health>()?;
    let frames = types.register_resource(FRAME_COUNTER)?;
    debug!(types = types.len(), "component types registered");

    scheduler.set_tag_order(tag_order());

    let mut descriptors = Vec::new();

    let w = Arc::clone(world);
    descriptors.push(
        SystemDescriptor::new(
            "input",
            guarded("input", fail, move |_| {
                for v in w.velocities.write().iter_mut() {
                    v.dx *= DRAG;
                    v.dy *= DRAG;
                }
                Ok(())
            }),
        )
        .writes(velocity)
        .with_tag(INPUT)
        .main_thread(),
    );

    let w = Arc::clone(world);
    descriptors.push(
        SystemDescriptor::new(
            "integrate",
            guarded("integrate", fail, move |ctx| {
                let velocities = w.velocities.read();
                let mut positions = w.positions.write();
                for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                    p.x += v.dx * ctx.dt;
                    p.y += v.dy * ctx.dt;
                }
                Ok(())
            }),
        )
        .reads(velocity)
        .writes(position)
        .with_tag(PHYSICS),
    );

    let w = Arc::clone(world);
    descriptors.push(
        SystemDescriptor::new(
            "regen",
            guarded("regen", fail, move |ctx| {
                for h in w.health.write().iter_mut() {
                    h.0 = (h.0 + REGEN_PER_SECOND * ctx.dt).min(100.0);
                }
                Ok(())
            }),
        )
        .writes(health),
    );

    let w = Arc::clone(world);
    descriptors.push(
        SystemDescriptor::new(
            "frame_counter",
            guarded("frame_counter", fail, move |ctx| {
                let frame = w.count_frame();
                trace!(tick_id = ctx.tick_id, frame, "frame counted");
                Ok(())
            }),
        )
        .writes(frames)
        .with_priority(10),
    );

    let w = Arc::clone(world);
    descriptors.push(
        SystemDescriptor::new(
            "render",
            guarded("render", fail, move |ctx| {
                let positions = w.positions.read();
                let health = w.health.read();
                let Some(first) = positions.first() else {
                    trace!(tick_id = ctx.tick_id, "empty world, nothing to render");
                    return Ok(());
                };
                let total_health: f64 = health.iter().map(|h| h.0).sum();
                trace!(
                    tick_id = ctx.tick_id,
                    x = first.x,
                    y = first.y,
                    total_health,
                    "frame rendered"
                );
                Ok(())
            }),
        )
        .reads(position)
        .reads(health)
        .with_tag(RENDER)
        .with_owner(RENDER_MODULE),
    );

    let mut ids = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        ids.push(scheduler.register(descriptor)?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use engine_schedule::{OutcomeStatus, TickError};

    use super::*;

    fn setup(fail: Option<&str>) -> (Scheduler, Arc<World>, Vec<SystemId>) {
        setup_with(4, fail)
    }

    fn setup_with(entities: usize, fail: Option<&str>) -> (Scheduler, Arc<World>, Vec<SystemId>) {
        let mut scheduler = Scheduler::inline();
        let types = TypeRegistry::new();
        let world = World::with_entities(entities);
        let ids = register_demo(&mut scheduler, &types, &world, fail).unwrap();
        (scheduler, world, ids)
    }

    fn names(scheduler: &Scheduler) -> Vec<Vec<String>> {
        scheduler
            .current_plan()
            .iter()
            .map(|wave| {
                wave.members()
                    .iter()
                    .map(|&id| scheduler.descriptor(id).unwrap().name().to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_demo_plan() {
        let (mut scheduler, _, ids) = setup(None);
        assert_eq!(ids.len(), 5);
        scheduler.prepare().unwrap();
        assert_eq!(
            names(&scheduler),
            vec![
                vec!["input".to_string()],
                vec!["integrate".to_string(), "regen".to_string()],
                vec!["frame_counter".to_string(), "render".to_string()],
            ]
        );
    }

    #[test]
    fn test_demo_moves_entities() {
        let (mut scheduler, world, _) = setup(None);
        for tick in 1..=3 {
            scheduler.run_tick(&TickContext::new(tick, 0.5)).unwrap();
        }
        assert_eq!(world.frames(), 3);
        assert!(world.positions.read()[0].x > 0.0);
    }

    #[test]
    fn test_empty_world_ticks_cleanly() {
        let (mut scheduler, world, ids) = setup_with(0, None);
        for tick in 1..=3 {
            let report = scheduler.run_tick(&TickContext::new(tick, 0.5)).unwrap();
            assert_eq!(
                report.outcome(ids[4]).unwrap().status,
                OutcomeStatus::Completed
            );
        }
        assert_eq!(world.frames(), 3);
    }

    #[test]
    fn test_injected_failure_skips_downstream() {
        let (mut scheduler, world, ids) = setup(Some("integrate"));
        let Err(TickError::Execution(failure)) =
            scheduler.run_tick(&TickContext::new(1, 0.5))
        else {
            panic!("expected an injected failure");
        };
        assert_eq!(failure.failures.len(), 1);
        assert_eq!(failure.failures[0].name, "integrate");
        let render = ids[4];
        assert_eq!(
            failure.report.outcome(render).unwrap().status,
            OutcomeStatus::Skipped { blocked_by: ids[1] }
        );
        // Unrelated systems still ran.
        assert_eq!(world.frames(), 1);
    }

    #[test]
    fn test_unload_render_module() {
        let (mut scheduler, _, ids) = setup(None);
        let removed = scheduler.unregister_module(RENDER_MODULE).unwrap();
        assert_eq!(removed, vec![ids[4]]);
        scheduler.prepare().unwrap();
        assert_eq!(scheduler.plan().system_count(), 4);
    }
}
