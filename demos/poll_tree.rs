/// Watches a directory tree and logs every change.
///
/// `cargo run --example poll_tree -- <path> [interval in ms]`
use std::{path::PathBuf, thread, time::Duration};

use crossbeam_channel::select;
use pollwatch::{Config, PollWatcher};

fn watch(path: PathBuf, interval: Duration) -> pollwatch::Result<()> {
    let watcher = PollWatcher::new(Config::default());
    watcher.add_recursive(&path)?;

    let poller = watcher.clone();
    let handle = thread::spawn(move || poller.start(interval));

    watcher.wait();
    log::info!("watching {path:?} every {interval:?}");

    loop {
        select! {
            recv(watcher.events()) -> event => match event {
                Ok(event) => log::info!("{event}"),
                Err(_) => break,
            },
            recv(watcher.errors()) -> err => {
                if let Ok(err) = err {
                    log::warn!("watch error: {err}");
                }
            }
            recv(watcher.closed()) -> _ => break,
        }
    }

    handle.join().expect("poll loop panicked")
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .map(PathBuf::from)
        .expect("Argument 1 needs to be a path");
    let interval = args
        .next()
        .map(|ms| ms.parse().expect("Argument 2 needs to be a number of milliseconds"))
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1));

    if let Err(err) = watch(path, interval) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
