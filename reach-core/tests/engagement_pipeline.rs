mod common;

use std::sync::Arc;

use tempfile::TempDir;

use reach_core::config::{EngageConfig, SelectorSection};
use reach_core::engage::{ActionPipeline, RunContext, StepOutcome, Target};
use reach_core::quota::{today, ActionKind, ActionLedger, CsvActionLog, DailyCounters};

use common::{shared_state, test_config, FakePage, FakeSurface, Shared};

struct Fixture {
    _dir: TempDir,
    log: Arc<CsvActionLog>,
    pipeline: ActionPipeline,
    run: RunContext,
}

fn fixture(adjust: impl FnOnce(&mut EngageConfig)) -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    adjust(&mut config);
    let log = Arc::new(CsvActionLog::new(&config.paths.action_log));
    let pipeline = ActionPipeline::from_config(&config, log.clone());
    let date = today();
    let daily = DailyCounters::seed(log.as_ref(), date).unwrap();
    Fixture {
        _dir: dir,
        log,
        pipeline,
        run: RunContext::new(date, daily),
    }
}

fn surface(state: &Shared) -> FakeSurface {
    FakeSurface::new(state.clone(), SelectorSection::default())
}

#[tokio::test]
async fn follow_limit_executes_exactly_the_limit_in_order() {
    let mut fx = fixture(|config| config.limits.follow_daily = 2);
    let urls = ["p1", "p2", "p3", "p4", "p5"];
    let pages: Vec<_> = urls.iter().map(|url| (*url, FakePage::likeable())).collect();
    let state = shared_state(&pages);
    let mut surface = surface(&state);

    let mut follows = Vec::new();
    for url in urls {
        let report = fx
            .pipeline
            .process(&mut surface, &Target::new(url).with_owner("owner"), &mut fx.run)
            .await;
        follows.push(report.follow.unwrap());
    }

    assert_eq!(
        follows,
        vec![
            StepOutcome::Executed,
            StepOutcome::Executed,
            StepOutcome::SkippedLimit,
            StepOutcome::SkippedLimit,
            StepOutcome::SkippedLimit,
        ]
    );
    assert_eq!(state.borrow().count("click フォローする"), 2);
    assert_eq!(fx.log.today_count(ActionKind::Follow).unwrap(), 2);
    assert_eq!(fx.run.counters.executed.follow, 2);
    assert_eq!(fx.run.counters.skipped_limit.follow, 3);

    let follow_rows: Vec<_> = fx
        .log
        .entries()
        .unwrap()
        .into_iter()
        .filter(|entry| entry.kind == ActionKind::Follow)
        .collect();
    assert!(follow_rows.iter().all(|entry| entry.target_url.is_empty()));
    assert!(follow_rows
        .iter()
        .all(|entry| entry.owner_url == "https://www.instagram.com/owner/"));
}

#[tokio::test]
async fn already_liked_target_never_attempts_a_comment() {
    let mut fx = fixture(|_| {});
    let state = shared_state(&[("liked", FakePage::already_liked())]);
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("liked"), &mut fx.run)
        .await;

    assert_eq!(report.like, Some(StepOutcome::SkippedAlready));
    assert_eq!(report.comment, None);
    assert!(!report.is_abandoned());
    let state = state.borrow();
    assert_eq!(state.count("type "), 0);
    assert_eq!(state.count("comment "), 0);
    assert_eq!(fx.log.today_count(ActionKind::Comment).unwrap(), 0);
}

#[tokio::test]
async fn invisible_like_control_counts_as_already_liked() {
    let mut fx = fixture(|_| {});
    let page = FakePage {
        like_visible: false,
        ..FakePage::likeable()
    };
    let state = shared_state(&[("hidden", page)]);
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("hidden"), &mut fx.run)
        .await;

    assert_eq!(report.like, Some(StepOutcome::SkippedAlready));
    assert_eq!(report.comment, None);
}

#[tokio::test]
async fn like_limit_still_lets_the_comment_run() {
    let mut fx = fixture(|config| config.limits.like_daily = 0);
    let state = shared_state(&[("post", FakePage::likeable())]);
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("post"), &mut fx.run)
        .await;

    assert_eq!(report.like, Some(StepOutcome::SkippedLimit));
    assert_eq!(report.comment, Some(StepOutcome::Executed));
    assert_eq!(fx.run.likes_this_run, 0);
    assert!(state.borrow().has("comment post"));
    assert!(state.borrow().has("type 素敵な投稿ですね！"));
}

#[tokio::test]
async fn following_owner_does_not_block_like() {
    let mut fx = fixture(|_| {});
    let state = shared_state(&[("post", FakePage::likeable().following())]);
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(
            &mut surface,
            &Target::new("post").with_owner("alice"),
            &mut fx.run,
        )
        .await;

    assert_eq!(report.follow, Some(StepOutcome::SkippedAlready));
    assert_eq!(report.like, Some(StepOutcome::Executed));
    assert_eq!(fx.run.likes_this_run, 1);

    let like = fx
        .log
        .entries()
        .unwrap()
        .into_iter()
        .find(|entry| entry.kind == ActionKind::Like)
        .unwrap();
    assert_eq!(like.target_url, "post");
    assert_eq!(like.owner_url, "https://www.instagram.com/alice/");
}

#[tokio::test]
async fn missing_comment_box_fails_without_recording() {
    let mut fx = fixture(|_| {});
    let page = FakePage {
        comment_box: false,
        ..FakePage::likeable()
    };
    let state = shared_state(&[("post", page)]);
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("post"), &mut fx.run)
        .await;

    assert!(matches!(report.comment, Some(StepOutcome::Failed(_))));
    assert!(!report.is_abandoned());
    assert_eq!(fx.run.counters.failed.comment, 1);
    assert_eq!(fx.run.daily.get(ActionKind::Comment), 0);
    assert_eq!(fx.log.today_count(ActionKind::Comment).unwrap(), 0);
}

#[tokio::test]
async fn comment_limit_skips_the_comment() {
    let mut fx = fixture(|config| config.limits.comment_daily = 0);
    let state = shared_state(&[("post", FakePage::likeable())]);
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("post"), &mut fx.run)
        .await;

    assert_eq!(report.comment, Some(StepOutcome::SkippedLimit));
    assert_eq!(state.borrow().count("type "), 0);
}

#[tokio::test]
async fn like_without_actionable_ancestor_abandons_the_target() {
    let mut fx = fixture(|_| {});
    let page = FakePage {
        like_has_ancestor: false,
        ..FakePage::likeable()
    };
    let state = shared_state(&[("post", page)]);
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("post"), &mut fx.run)
        .await;

    assert!(report.is_abandoned());
    assert_eq!(report.like, None);
    assert_eq!(report.comment, None);
    assert_eq!(fx.run.counters.targets_abandoned, 1);
    assert_eq!(state.borrow().count("screenshot "), 1);
}

#[tokio::test]
async fn navigation_failure_abandons_with_a_screenshot() {
    let mut fx = fixture(|_| {});
    let state = shared_state(&[("good", FakePage::likeable())]);
    state.borrow_mut().failing_urls.insert("broken".into());
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("broken"), &mut fx.run)
        .await;
    assert!(report.is_abandoned());
    assert_eq!(report.follow, None);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("good"), &mut fx.run)
        .await;
    assert_eq!(report.like, Some(StepOutcome::Executed));

    let state = state.borrow();
    assert_eq!(state.count("screenshot "), 1);
    assert!(state
        .events
        .iter()
        .any(|event| event.starts_with("screenshot ") && event.ends_with("_abandoned.png")));
    assert_eq!(fx.run.counters.targets_processed, 2);
    assert_eq!(fx.run.counters.targets_abandoned, 1);
}

#[tokio::test]
async fn existing_log_rows_count_towards_the_daily_limit() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.limits.like_daily = 1;
    let log = Arc::new(CsvActionLog::new(&config.paths.action_log));
    log.record(today(), ActionKind::Like, "earlier", "").unwrap();

    let pipeline = ActionPipeline::from_config(&config, log.clone());
    let mut run = RunContext::new(today(), DailyCounters::seed(log.as_ref(), today()).unwrap());
    let state = shared_state(&[("post", FakePage::likeable())]);
    let mut surface = surface(&state);

    let report = pipeline
        .process(&mut surface, &Target::new("post"), &mut run)
        .await;

    assert_eq!(report.like, Some(StepOutcome::SkippedLimit));
    assert_eq!(log.today_count(ActionKind::Like).unwrap(), 1);
}

#[tokio::test]
async fn failed_follow_click_still_runs_the_like() {
    let mut fx = fixture(|_| {});
    let state = shared_state(&[("post", FakePage::likeable())]);
    state.borrow_mut().failing_actions.insert("follow");
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("post").with_owner("owner"), &mut fx.run)
        .await;

    assert!(matches!(report.follow, Some(StepOutcome::Failed(_))));
    assert_eq!(report.like, Some(StepOutcome::Executed));
    assert_eq!(report.comment, Some(StepOutcome::Executed));
    assert!(!report.is_abandoned());
    assert_eq!(fx.run.counters.failed.follow, 1);
    assert_eq!(fx.run.daily.get(ActionKind::Follow), 0);
    assert_eq!(fx.log.today_count(ActionKind::Follow).unwrap(), 0);
    assert!(state.borrow().has("like post"));
}

#[tokio::test]
async fn failed_like_click_abandons_without_recording() {
    let mut fx = fixture(|_| {});
    let state = shared_state(&[("post", FakePage::likeable())]);
    state.borrow_mut().failing_actions.insert("like");
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("post"), &mut fx.run)
        .await;

    assert!(report.is_abandoned());
    assert_eq!(report.like, None);
    assert_eq!(report.comment, None);
    assert_eq!(fx.run.likes_this_run, 0);
    assert_eq!(fx.run.daily.get(ActionKind::Like), 0);
    assert_eq!(fx.log.today_count(ActionKind::Like).unwrap(), 0);
    let state = state.borrow();
    assert!(state.has("failed like post"));
    assert_eq!(state.count("type "), 0);
    assert_eq!(state.count("screenshot "), 1);
}

#[tokio::test]
async fn failed_typing_marks_the_comment_failed() {
    let mut fx = fixture(|_| {});
    let state = shared_state(&[("post", FakePage::likeable())]);
    state.borrow_mut().failing_actions.insert("type");
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("post"), &mut fx.run)
        .await;

    assert_eq!(report.like, Some(StepOutcome::Executed));
    assert!(matches!(report.comment, Some(StepOutcome::Failed(_))));
    assert!(!report.is_abandoned());
    assert_eq!(fx.run.counters.failed.comment, 1);
    assert_eq!(fx.log.today_count(ActionKind::Comment).unwrap(), 0);
    assert_eq!(state.borrow().count("comment "), 0);
}

#[tokio::test]
async fn missing_submit_control_fails_the_comment_only() {
    let mut fx = fixture(|_| {});
    let page = FakePage {
        submit_button: false,
        ..FakePage::likeable()
    };
    let state = shared_state(&[("post", page)]);
    let mut surface = surface(&state);

    let report = fx
        .pipeline
        .process(&mut surface, &Target::new("post"), &mut fx.run)
        .await;

    assert_eq!(report.like, Some(StepOutcome::Executed));
    assert!(matches!(report.comment, Some(StepOutcome::Failed(_))));
    assert!(!report.is_abandoned());
    assert_eq!(fx.run.daily.get(ActionKind::Comment), 0);
    assert_eq!(fx.log.today_count(ActionKind::Comment).unwrap(), 0);
    let state = state.borrow();
    assert!(state.has("type 素敵な投稿ですね！"));
    assert_eq!(state.count("comment "), 0);
}
