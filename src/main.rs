use std::time::Duration;

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("igcse-exam: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(igcse_exam_client::run());
    // A pending stdin read cannot be cancelled; do not wait for it on exit.
    runtime.shutdown_timeout(Duration::from_millis(200));

    if let Err(e) = result {
        eprintln!("igcse-exam: {e:#}");
        std::process::exit(1);
    }
}
