use anyhow::Result;
use diesel::{
    PgConnection,
    r2d2::{ConnectionManager, Pool},
};

pub type PgPoolSquad = Pool<ConnectionManager<PgConnection>>;

/// Connections are held only for the scope of a single transaction; the
/// pool bounds come straight from configuration.
pub fn establish_connection(
    database_url: &str,
    max_open_conns: u32,
    max_idle_conns: u32,
) -> Result<PgPoolSquad> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_open_conns)
        .min_idle(Some(max_idle_conns.min(max_open_conns)))
        .build(manager)?;
    Ok(pool)
}
