use super::Conn;

pub fn run() -> Result<(), String> {
    let conns: Vec<Conn> = (0..4).map(|i| Conn::open(format!("worker.{i}"))).collect();
    for conn in conns {
        conn.close();
    }
    println!("every connection was closed; nothing should be reported");
    Ok(())
}
