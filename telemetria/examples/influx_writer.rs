use std::{thread, time::Duration};

use telemetria::{new_recorder, Metric, Recorder};

fn main() {
    tracing_subscriber::fmt::init();

    let address = std::env::args().nth(1).unwrap_or_else(|| "http://localhost:8086/telemetria".to_owned());
    let recorder = new_recorder(&address).expect("failed to create recorder").with_precision("ms");

    let mut iteration = 0i64;
    loop {
        iteration += 1;

        let metrics = [
            Metric::new("demo_loop").with_tag("host", "local").with_field("iteration", iteration),
            Metric::new("demo_health").with_field("healthy", iteration % 10 != 0).with_field("load", 0.25),
        ];
        if let Err(e) = recorder.write_many(&metrics) {
            eprintln!("write failed: {e}");
        }

        thread::sleep(Duration::from_secs(1));
    }
}
