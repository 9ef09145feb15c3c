//! Link lifecycle, dispatch and state tracking over a mock channel

use grblstream_communication::{
    FlowStrategy, GrblLink, LinkConfig, Message, MockChannel, RealtimeCommand, Response,
    StatusValue,
};
use grblstream_core::{ConnectionError, Error};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn link_with(config: LinkConfig) -> (GrblLink, MockChannel) {
    let mock = MockChannel::new();
    (GrblLink::new(Box::new(mock.clone()), config), mock)
}

fn drain(link: &GrblLink) {
    while link.pump_once().unwrap() {}
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[test]
fn test_state_follows_inbound_lines() {
    let (link, mock) = link_with(LinkConfig::default());
    for line in [
        "Grbl 1.1f ['$' for help]",
        "$110=500.000",
        "<Idle|MPos:0.000,0.000,0.000|FS:0,0>",
        "[MSG:Caution: Unlocked]",
        "<Run|MPos:1.000,0.000,0.000|FS:300,0>",
        "ALARM:1",
    ] {
        mock.push_line(line);
    }
    drain(&link);

    let state = link.current_state();
    assert_eq!(state.version.as_deref(), Some("1.1f"));
    assert_eq!(state.setting("110"), Some("500.000"));
    assert_eq!(state.mode(), Some("Run"));
    assert_eq!(state.alarm_code.as_deref(), Some("1"));
    assert_eq!(
        state.status_field("FS").and_then(StatusValue::as_numbers),
        Some(vec![300.0, 0.0])
    );
}

#[test]
fn test_state_replay_is_idempotent() {
    let (link, mock) = link_with(LinkConfig::default());
    mock.push_line("<Idle|MPos:0.000,0.000,0.000|FS:0,0>");
    drain(&link);
    let once = link.current_state();

    mock.push_line("<Idle|MPos:0.000,0.000,0.000|FS:0,0>");
    drain(&link);
    assert_eq!(link.current_state(), once);
}

#[test]
fn test_malformed_input_is_dropped() {
    let (link, mock) = link_with(LinkConfig::default());
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    link.register_observer(move |_, _| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    mock.push_raw_line(b"\xff\xfe\xfd");
    mock.push_line("[GC:G0 G54 G17 G21 G90 G94]");
    mock.push_line("   ");
    mock.push_line("[MSG:Enabled]");
    drain(&link);

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(mock.pending_lines(), 0);
}

#[test]
fn test_observers_in_order_with_faults_isolated() {
    let (link, mock) = link_with(LinkConfig::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    let o = order.clone();
    link.register_observer(move |_, _| {
        o.lock().push("first");
        anyhow::bail!("first observer refuses")
    });
    link.register_observer(|_, _| panic!("second observer panics"));
    let o = order.clone();
    link.register_observer(move |_, _| {
        o.lock().push("third");
        Ok(())
    });

    mock.push_line("[MSG:Enabled]");
    drain(&link);
    assert_eq!(*order.lock(), vec!["first", "third"]);
}

#[test]
fn test_observer_can_enqueue_follow_up() {
    let (link, mock) = link_with(LinkConfig {
        flow_control: FlowStrategy::AcknowledgeGated,
        ..Default::default()
    });
    link.register_observer(|msg, link| {
        if msg.mode() == Some("Alarm") {
            link.unlock()?;
        }
        Ok(())
    });

    mock.push_line("<Alarm|MPos:0.000,0.000,0.000>");
    drain(&link);
    assert_eq!(mock.written_text(), vec!["$X\n"]);
}

#[test]
fn test_unregister_observer() {
    let (link, mock) = link_with(LinkConfig::default());
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let handle = link.register_observer(move |_, _| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    mock.push_line("[MSG:one]");
    drain(&link);
    assert!(link.unregister_observer(handle));
    mock.push_line("[MSG:two]");
    drain(&link);

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_device_errors_are_ordinary_messages() {
    let (link, mock) = link_with(LinkConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    link.register_observer(move |msg, _| {
        s.lock().push(msg.clone());
        Ok(())
    });

    link.enqueue("G99").unwrap();
    drain(&link);
    mock.push_line("error:20");
    drain(&link);

    assert!(link.fault().is_none());
    assert!(link.is_idle());
    assert_eq!(
        *seen.lock(),
        vec![Message::Response(Response::Error {
            code: "20".to_string()
        })]
    );
}

#[test]
fn test_query_on_welcome() {
    let (link, mock) = link_with(LinkConfig {
        query_on_welcome: true,
        ..Default::default()
    });

    mock.push_line("Grbl 1.1f ['$' for help]");
    drain(&link);

    assert_eq!(mock.written(), vec![b"?".to_vec(), b"$$\n".to_vec()]);
}

#[test]
fn test_query_on_welcome_with_tiny_budget_keeps_pumping() {
    let (link, mock) = link_with(LinkConfig {
        flow_control: FlowStrategy::ByteBudgeted { capacity: 3 },
        query_on_welcome: true,
        ..Default::default()
    });
    let welcomes = Arc::new(AtomicUsize::new(0));
    let w = welcomes.clone();
    link.register_observer(move |msg, _| {
        if matches!(msg, Message::Welcome { .. }) {
            w.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    });

    mock.push_line("Grbl 1.1f ['$' for help]");
    assert!(link.pump_once().unwrap());
    drain(&link);

    // `$$\n` can never fit a 3-byte budget, so only the status query goes out
    assert_eq!(welcomes.load(Ordering::SeqCst), 1);
    assert_eq!(mock.written(), vec![b"?".to_vec()]);
    assert_eq!(link.queued_len(), 0);
    assert_eq!(link.current_state().version.as_deref(), Some("1.1f"));
}

#[test]
fn test_realtime_bypasses_queue_and_gate() {
    let (link, mock) = link_with(LinkConfig {
        flow_control: FlowStrategy::AcknowledgeGated,
        ..Default::default()
    });
    link.enqueue("G1 X10 F100").unwrap();
    link.enqueue("G1 X20 F100").unwrap();
    drain(&link);

    link.feed_hold().unwrap();
    link.send_realtime(RealtimeCommand::FeedOverrideCoarsePlus).unwrap();
    link.cycle_start().unwrap();

    assert_eq!(
        mock.written(),
        vec![b"G1 X10 F100\n".to_vec(), b"!".to_vec(), vec![0x91], b"~".to_vec()]
    );
    assert_eq!(link.queued_len(), 1);
}

#[test]
fn test_channel_failure_surfaces_from_pump() {
    let (link, mock) = link_with(LinkConfig::default());
    mock.set_fail_reads(true);
    let err = link.pump_once().unwrap_err();
    assert!(err.is_connection_error());

    mock.set_fail_reads(false);
    mock.set_fail_writes(true);
    link.enqueue("G0 X1").unwrap();
    assert!(link.pump_once().unwrap_err().is_connection_error());
    assert!(link.query_status().is_err());
}

#[tokio::test]
async fn test_worker_streams_and_stops() {
    let (link, mock) = link_with(LinkConfig {
        idle_delay: Duration::from_millis(1),
        ..Default::default()
    });

    link.start().unwrap();
    assert!(link.is_running());
    assert!(matches!(
        link.start(),
        Err(Error::Connection(ConnectionError::AlreadyRunning))
    ));

    link.enqueue("G0 X1").unwrap();
    link.enqueue("G0 X2").unwrap();
    assert!(wait_until(|| mock.written().len() == 2).await);

    mock.push_line("ok");
    mock.push_line("ok");
    mock.push_line("<Idle|MPos:0.000,0.000,0.000|FS:0,0>");
    assert!(wait_until(|| link.current_state().mode() == Some("Idle")).await);
    assert!(link.is_idle());

    link.stop().await.unwrap();
    assert!(!link.is_running());
    assert!(matches!(
        link.stop().await,
        Err(Error::Connection(ConnectionError::NotRunning))
    ));
}

#[tokio::test]
async fn test_stop_discards_in_flight() {
    let (link, mock) = link_with(LinkConfig {
        idle_delay: Duration::from_millis(1),
        ..Default::default()
    });
    link.start().unwrap();
    link.enqueue("G0 X1").unwrap();
    assert!(wait_until(|| mock.written().len() == 1).await);

    link.stop().await.unwrap();
    assert_eq!(link.planner_usage().in_flight, 0);
}

#[tokio::test]
async fn test_worker_ends_on_channel_failure() {
    let (link, mock) = link_with(LinkConfig {
        idle_delay: Duration::from_millis(1),
        ..Default::default()
    });
    link.start().unwrap();

    mock.set_fail_reads(true);
    assert!(wait_until(|| !link.is_running()).await);

    let err = link.stop().await.unwrap_err();
    assert!(err.is_connection_error());
}

#[tokio::test]
async fn test_status_polling() {
    let (link, mock) = link_with(LinkConfig {
        idle_delay: Duration::from_millis(1),
        status_poll_interval: Some(Duration::from_millis(10)),
        ..Default::default()
    });
    link.start().unwrap();

    assert!(wait_until(|| mock.written().len() >= 3).await);
    link.stop().await.unwrap();

    assert!(mock.written().iter().all(|w| w.as_slice() == b"?"));
}

#[tokio::test]
async fn test_stop_reports_unresolved_desync() {
    let (link, mock) = link_with(LinkConfig {
        idle_delay: Duration::from_millis(1),
        ..Default::default()
    });
    link.start().unwrap();

    mock.push_line("ok");
    assert!(wait_until(|| link.fault().is_some()).await);
    assert!(link.is_running());

    let err = link.stop().await.unwrap_err();
    assert!(err.is_desync());
}

#[tokio::test]
async fn test_concurrent_producers_keep_their_order() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 25;

    let (link, mock) = link_with(LinkConfig {
        idle_delay: Duration::from_millis(1),
        ..Default::default()
    });
    link.start().unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let link = link.clone();
            thread::spawn(move || {
                for k in 0..PER_PRODUCER {
                    link.enqueue(format!("G1 X{} Y{}", p, k)).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let total = PRODUCERS * PER_PRODUCER;
    let mut acked = 0;
    let done = wait_until(|| {
        let written = mock.written().len();
        while acked < written {
            mock.push_line("ok");
            acked += 1;
        }
        written == total && link.is_idle()
    })
    .await;
    assert!(done);
    link.stop().await.unwrap();

    let written = mock.written_text();
    assert_eq!(written.len(), total);
    let unique: HashSet<&String> = written.iter().collect();
    assert_eq!(unique.len(), total);

    for p in 0..PRODUCERS {
        let prefix = format!("G1 X{} ", p);
        let sequence: Vec<&String> = written.iter().filter(|w| w.starts_with(&prefix)).collect();
        let expected: Vec<String> = (0..PER_PRODUCER)
            .map(|k| format!("G1 X{} Y{}\n", p, k))
            .collect();
        assert_eq!(sequence, expected.iter().collect::<Vec<_>>());
    }
}
