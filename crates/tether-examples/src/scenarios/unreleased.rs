use super::Conn;

/// Opens three connections, closes one, and drops the other two on the floor.
pub fn run() -> Result<(), String> {
    let primary = Conn::open("db.primary");
    let replica = Conn::open("db.replica");
    let cache = Conn::open("cache");

    println!("outstanding before drop:");
    super::dump_registry(false)?;

    primary.close();

    println!("dropping {} and {} without closing them", replica.name(), cache.name());
    drop(replica);
    drop(cache);
    Ok(())
}
