/// Decide and evolve in one step: run `handle`, then apply every emitted event
/// to the aggregate in place.
///
/// No store or bus is involved, so this is what aggregate unit tests use.
/// Requests go through `CommandDispatcher::dispatch`, which also persists and
/// publishes.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: woodhop_core::Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
