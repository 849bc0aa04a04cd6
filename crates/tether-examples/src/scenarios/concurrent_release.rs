use std::sync::Barrier;

use super::Conn;

/// Several threads race to release the same connection. Exactly one of them
/// wins; the rest are no-ops.
pub fn run(threads: usize) -> Result<(), String> {
    let threads = threads.max(1);
    let conn = Conn::open("shared");
    let barrier = Barrier::new(threads);

    let outcomes: Vec<Result<bool, String>> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    conn.release()
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().unwrap_or_else(|_| Err("release thread panicked".to_string())))
            .collect()
    });

    let mut winners = 0;
    for outcome in outcomes {
        if outcome? {
            winners += 1;
        }
    }
    println!("{threads} threads released {}; {winners} cancelled the cleanup", conn.name());

    if winners != 1 {
        return Err(format!("expected exactly one winning release, got {winners}"));
    }
    Ok(())
}
