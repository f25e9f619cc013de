use sieve_ecs::{World, WorldConfig};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Acceleration {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Frozen;

const DEFAULT_FILTER: &str = "(Velocity | Acceleration) & !Frozen";

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sieve_demo=info".parse()?)
                .add_directive("sieve_ecs=debug".parse()?),
        )
        .init();

    let source = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_FILTER.to_owned());

    let mut world = World::with_config(WorldConfig {
        entity_capacity: 64,
        ..WorldConfig::default()
    });
    let pos = world.register::<Position>()?;
    world.register::<Velocity>()?;
    world.register::<Acceleration>()?;
    world.register::<Frozen>()?;

    let mut spawned = Vec::new();
    for i in 0..12u8 {
        let f = f32::from(i);
        let mut builder = world.build_entity().with(Position { x: f, y: 0.0 })?;
        if i % 2 == 0 {
            builder = builder.with(Velocity { x: 1.0, y: 0.5 })?;
        }
        if i % 3 == 0 {
            builder = builder.with(Acceleration { x: 0.0, y: -9.8 })?;
        }
        if i % 4 == 0 {
            builder = builder.with(Frozen)?;
        }
        spawned.push(builder.id());
    }
    info!(entities = spawned.len(), "spawned");

    let filter = world.parse_filter(&source)?;
    let compiled = world.compile_filter(&filter)?;
    info!(
        filter = %world.describe(&filter),
        compiled = %world.describe_compiled(&compiled),
        "compiled filter"
    );

    let query = world.query(&[pos])?.filter(filter);

    // Integrate one step for every match. Values are read at visit time, so
    // the world can be written between cursor steps.
    let mut cursor = query.cursor(&world)?;
    info!(candidates = cursor.candidates().len(), "query started");
    while let Some(entity) = cursor.next_match(&world) {
        let velocity = world.get_optional::<Velocity>(entity).copied();
        let acceleration = world.get_optional::<Acceleration>(entity).copied();

        let position = world.get_mut::<Position>(entity)?;
        if let Some(v) = velocity {
            position.x += v.x;
            position.y += v.y;
        }
        if let Some(a) = acceleration {
            position.x = a.x.mul_add(0.5, position.x);
            position.y = a.y.mul_add(0.5, position.y);
        }
        let position = *position;

        info!(%entity, x = position.x, y = position.y, "moved");

        // anything that fell below the floor is gone before the next step
        if position.y < -4.0 && world.despawn(entity) {
            warn!(%entity, "despawned below floor");
        }
    }

    let remaining = query.iter(&world)?.count();
    info!(remaining, cache = world.filter_cache().len(), "done");

    Ok(())
}
