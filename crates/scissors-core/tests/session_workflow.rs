//! End-to-end session tests: the background worker, stale results,
//! undo, and tracing a closed contour on a synthetic image.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::time::Duration;

use image::{GrayImage, Luma};
use scissors_core::{
    GridCoord, ManualClock, Placement, Point, SeedOutcome, SegmentWorker, Session, SessionConfig,
    SessionState, build_gradient_field,
};

const WAIT: Duration = Duration::from_secs(10);

/// Black 80x80 canvas with a white rectangle covering `[20, 60) x [25, 55)`.
fn rectangle_image() -> GrayImage {
    GrayImage::from_fn(80, 80, |x, y| {
        let inside = (20..60).contains(&x) && (25..55).contains(&y);
        Luma([if inside { 255 } else { 0 }])
    })
}

fn session(img: &GrayImage, config: SessionConfig) -> Session<ManualClock> {
    Session::with_clock(build_gradient_field(img), config, ManualClock::new()).unwrap()
}

fn flat_session(size: u32) -> Session<ManualClock> {
    let config = SessionConfig {
        snap_enabled: false,
        ..SessionConfig::default()
    };
    session(&GrayImage::new(size, size), config)
}

fn pending(outcome: SeedOutcome) -> scissors_core::SegmentJob {
    match outcome {
        SeedOutcome::Pending(job) => job,
        other => panic!("expected a pending job, got {other:?}"),
    }
}

#[test]
fn worker_results_are_applied() {
    let worker = SegmentWorker::spawn().unwrap();
    let mut s = flat_session(40);
    assert!(matches!(
        s.begin_seed(Point::new(2.0, 2.0)).unwrap(),
        SeedOutcome::Started(_)
    ));

    worker
        .submit(pending(s.begin_seed(Point::new(30.0, 5.0)).unwrap()))
        .unwrap();
    let response = worker.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(
        s.apply(response).unwrap(),
        Placement::Extended { auto_anchors: 0 }
    );
    assert_eq!(s.seeds().len(), 2);
    assert_eq!(s.segments().len(), 1);
    assert!(s.pending().is_none());
}

#[test]
fn result_arriving_after_cancel_is_discarded() {
    let worker = SegmentWorker::spawn().unwrap();
    let mut s = flat_session(40);
    s.place_seed(Point::new(2.0, 2.0)).unwrap();
    worker
        .submit(pending(s.begin_seed(Point::new(30.0, 30.0)).unwrap()))
        .unwrap();
    s.cancel();

    let response = worker.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(s.apply(response).unwrap(), Placement::Stale);
    assert_eq!(s.state(), SessionState::Idle);
    assert!(s.seeds().is_empty());
    assert!(s.segments().is_empty());
}

#[test]
fn only_latest_of_overlapping_requests_applies() {
    let worker = SegmentWorker::spawn().unwrap();
    let mut s = flat_session(40);
    s.place_seed(Point::new(2.0, 2.0)).unwrap();
    worker
        .submit(pending(s.begin_seed(Point::new(30.0, 2.0)).unwrap()))
        .unwrap();
    worker
        .submit(pending(s.begin_seed(Point::new(2.0, 30.0)).unwrap()))
        .unwrap();

    let first = worker.recv_timeout(WAIT).unwrap().unwrap();
    let second = worker.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(s.apply(first).unwrap(), Placement::Stale);
    assert!(matches!(s.apply(second).unwrap(), Placement::Extended { .. }));
    assert_eq!(s.seeds().last().unwrap().coord, GridCoord::new(2, 30));
    assert_eq!(s.segments().len(), 1);
    assert_eq!(s.diagnostics().dropped_clicks, 1);
}

#[test]
fn undo_restores_previous_placement() {
    let mut s = flat_session(64);
    s.place_seed(Point::new(5.0, 5.0)).unwrap();
    s.place_seed(Point::new(40.0, 8.0)).unwrap();
    let seeds = s.seeds().to_vec();
    let segments = s.segments().to_vec();

    s.place_seed(Point::new(40.0, 50.0)).unwrap();
    assert!(s.undo());

    assert_eq!(s.seeds(), seeds.as_slice());
    assert_eq!(s.segments(), segments.as_slice());
    assert_eq!(s.state(), SessionState::Collecting);
    assert!(s.cache().is_empty());
}

#[test]
fn rectangle_is_traced_along_its_border() {
    let mut s = session(&rectangle_image(), SessionConfig::default());
    let clicks = [
        Point::new(21.0, 26.0),
        Point::new(58.0, 26.0),
        Point::new(58.0, 53.0),
        Point::new(21.0, 53.0),
    ];
    for click in clicks {
        s.place_seed(click).unwrap();
    }
    assert_eq!(s.state(), SessionState::Collecting);

    // Pointer drifts back toward the start.
    assert_eq!(
        s.move_live(Point::new(23.0, 30.0)).unwrap(),
        scissors_core::LiveUpdate::Updated
    );
    assert_eq!(s.state(), SessionState::Closing);

    assert_eq!(s.place_seed(Point::new(22.0, 27.0)).unwrap(), Placement::Closed);
    assert!(s.is_closed());
    assert_eq!(s.segments().len(), s.seeds().len());

    let path = s.committed_path();
    assert!(path.len() > 100);
    for c in &path {
        let on_vertical = (18..=21).contains(&c.x) || (58..=61).contains(&c.x);
        let on_horizontal = (23..=26).contains(&c.y) || (53..=56).contains(&c.y);
        assert!(on_vertical || on_horizontal, "{c} leaves the border");
    }

    let diag = s.diagnostics();
    assert_eq!(diag.state, SessionState::Completed);
    assert_eq!(diag.user_seeds, 4);
    assert!(diag.path_length > 100.0);
}

#[test]
fn long_weak_span_gets_auto_anchors() {
    // A bright horizontal band; the planner may anchor on its edge.
    let img = GrayImage::from_fn(200, 20, |_, y| Luma([if y < 10 { 0 } else { 255 }]));
    let mut config = SessionConfig {
        snap_enabled: false,
        ..SessionConfig::default()
    };
    config.auto_anchor.base_threshold = 20.0;
    config.auto_anchor.complexity_span = 0.0;
    let mut s = session(&img, config);

    s.place_seed(Point::new(0.0, 10.0)).unwrap();
    let placement = s.place_seed(Point::new(199.0, 10.0)).unwrap();
    let Placement::Extended { auto_anchors } = placement else {
        panic!("unexpected placement {placement:?}");
    };
    assert!(auto_anchors > 0);
    assert_eq!(s.seeds().len(), auto_anchors + 2);
    assert_eq!(s.segments().len(), auto_anchors + 1);
    assert!(s.seeds()[1..=auto_anchors].iter().all(|p| p.auto_generated));
    assert!(!s.seeds().last().unwrap().auto_generated);

    // Undo removes the user seed together with its auto anchors.
    assert!(s.undo());
    assert_eq!(s.seeds().len(), 1);
    assert!(s.segments().is_empty());
}
