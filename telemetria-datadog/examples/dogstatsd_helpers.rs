use std::{thread, time::Duration};

use telemetria_datadog::{self as dd, with_rate, with_tag, ClientContext, Event, StatsdClientBuilder};

fn main() {
    tracing_subscriber::fmt::init();

    let builder = StatsdClientBuilder::default()
        .with_remote_address("localhost:9125")
        .expect("failed to parse remote address")
        .with_tag("env", "demo");
    let ctx = dd::new(&ClientContext::default(), "telemetria", builder).expect("failed to build statsd client");

    dd::event(&ctx, &Event::new("Demo started", "Sending metrics every 100ms")).expect("failed to send event");

    for i in 0..100 {
        let done = dd::timing_defer(&ctx, "demo.iteration", &[]);

        dd::incr(&ctx, "demo.loops", &[with_tag("system", "foo")]).expect("failed to send counter");
        dd::gauge(&ctx, "demo.progress", f64::from(i), &[]).expect("failed to send gauge");
        dd::histogram(&ctx, "demo.sampled", f64::from(i % 7), &[with_rate(0.5)]).expect("failed to send histogram");
        dd::set(&ctx, "demo.workers", if i % 2 == 0 { "even" } else { "odd" }, &[]).expect("failed to send set");

        thread::sleep(Duration::from_millis(100));
        done();
    }

    dd::close(&ctx).expect("failed to close client");
}
