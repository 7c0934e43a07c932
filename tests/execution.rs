use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;
use pepino::{
    extension::{self, ExtensionDescriptor, Instance, Registration},
    observer::Recorder,
    parser::Document,
    plan::{NodeType, Outcome, PlanNode},
    runner::ManualClock,
    step::{Assertion, Hook, StepContributor, StepDefinition},
    Configuration, ErrorKind, EventKind, Registry, Reporter, Runner,
};

type Log = Arc<Mutex<Vec<String>>>;

struct Basket(i64);

#[derive(Clone, Default)]
struct Kitchen {
    steps: Vec<StepDefinition>,
    hooks: Vec<Hook>,
}

impl StepContributor for Kitchen {
    fn info(&self) -> String {
        "kitchen".to_owned()
    }

    fn steps(&self) -> Vec<StepDefinition> {
        self.steps.clone()
    }

    fn hooks(&self) -> Vec<Hook> {
        self.hooks.clone()
    }
}

impl Kitchen {
    fn new(log: &Log) -> Self {
        let (fill, eat, count, fire) =
            (log.clone(), log.clone(), log.clone(), log.clone());
        Self {
            steps: vec![
                StepDefinition::new(
                    "fill",
                    "there are {count:integer} cucumbers",
                    move |ctx, args| {
                        let count = args.value::<i64>("count")?;
                        fill.lock().push(format!("fill {count}"));
                        let _ = ctx.insert(Basket(count));
                        Ok(())
                    },
                ),
                StepDefinition::new(
                    "eat",
                    "I eat {count:integer} cucumbers",
                    move |ctx, args| {
                        let count = args.value::<i64>("count")?;
                        eat.lock().push(format!("eat {count}"));
                        let basket = ctx
                            .get_mut::<Basket>()
                            .ok_or_else(|| anyhow::anyhow!("no basket"))?;
                        basket.0 -= count;
                        Ok(())
                    },
                ),
                StepDefinition::new(
                    "count",
                    "the basket count {expected:integer-assertion}",
                    move |ctx, args| {
                        let expected = args.value::<Assertion>("expected")?;
                        count.lock().push("count".to_owned());
                        let basket = ctx
                            .get::<Basket>()
                            .ok_or_else(|| anyhow::anyhow!("no basket"))?;
                        expected.check(basket.0)?;
                        Ok(())
                    },
                ),
                StepDefinition::new(
                    "fire",
                    "the kitchen catches fire",
                    move |_, _| {
                        fire.lock().push("fire".to_owned());
                        panic!("everything burns");
                    },
                ),
            ],
            hooks: Vec::new(),
        }
    }

    fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    fn with_hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }
}

fn registry(kitchen: Kitchen) -> Registry {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let contributor: Arc<dyn StepContributor> = Arc::new(kitchen);
    let registry = Registry::new();
    let _ = registry.register_one(Registration::new(
        ExtensionDescriptor::new("test", "kitchen", &extension::STEP_CONTRIBUTOR),
        move || Instance::new(Arc::clone(&contributor)),
    ));
    registry
}

fn document(text: &str) -> Document {
    Document::parse(text, "en").expect("valid document")
}

fn case<'p>(plan: &'p PlanNode, name: &str) -> &'p PlanNode {
    plan.test_cases()
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("no test case `{name}`"))
}

fn results(case: &PlanNode) -> Vec<Option<Outcome>> {
    case.leaves().map(PlanNode::result).collect()
}

const CUCUMBERS: &str = r"
Feature: Cucumbers

  Scenario: counting
    Given there are 12 cucumbers
    When I eat 5 cucumbers
    Then the basket count is equal to 7

  Scenario: unknown
    Given nobody implemented this
    Then the basket count is equal to 7

  Scenario: still runs
    Given there are 1 cucumbers
";

#[test]
fn undefined_step_does_not_abort_siblings() {
    let log = Log::default();
    let runner = Runner::new(&registry(Kitchen::new(&log)), &Configuration::empty())
        .expect("runner");
    let mut plan = runner.plan(&[document(CUCUMBERS)]).expect("plan");

    let result = runner.run(&mut plan);

    assert_eq!(result, Some(Outcome::Undefined));
    assert_eq!(case(&plan, "counting").result(), Some(Outcome::Passed));
    assert_eq!(
        results(case(&plan, "unknown")),
        [Some(Outcome::Undefined), Some(Outcome::Skipped)],
    );
    assert_eq!(case(&plan, "still runs").result(), Some(Outcome::Passed));
    assert_eq!(*log.lock(), ["fill 12", "eat 5", "count", "fill 1"]);
}

#[test]
fn failed_assertion_skips_the_rest() {
    let log = Log::default();
    let runner = Runner::new(&registry(Kitchen::new(&log)), &Configuration::empty())
        .expect("runner");
    let mut plan = runner
        .plan(&[document(
            r"
Feature: Greedy
  Scenario: too many
    Given there are 3 cucumbers
    Then the basket count is greater than 5
    When I eat 1 cucumbers
",
        )])
        .expect("plan");

    let _ = runner.run(&mut plan);

    let case = case(&plan, "too many");
    assert_eq!(
        results(case),
        [Some(Outcome::Passed), Some(Outcome::Failed), Some(Outcome::Skipped)],
    );
    let failed = case.leaves().nth(1).expect("second step");
    assert!(failed.message().is_some_and(|m| m.contains("greater than 5")));
    assert_eq!(*log.lock(), ["fill 3", "count"]);
}

#[test]
fn panicking_step_is_an_error() {
    let log = Log::default();
    let runner = Runner::new(&registry(Kitchen::new(&log)), &Configuration::empty())
        .expect("runner");
    let mut plan = runner
        .plan(&[document(
            r"
Feature: Accidents
  Scenario: fire
    Given the kitchen catches fire
    Then there are 0 cucumbers
",
        )])
        .expect("plan");

    assert_eq!(runner.run(&mut plan), Some(Outcome::Error));

    let leaf = case(&plan, "fire").leaves().next().expect("step");
    assert_eq!(leaf.message(), Some("Panicked: everything burns"));
    assert!(leaf.state.as_ref().is_some_and(|s| s.cause.is_some()));
}

#[test]
fn missing_fixture_is_an_error() {
    let log = Log::default();
    let runner = Runner::new(&registry(Kitchen::new(&log)), &Configuration::empty())
        .expect("runner");
    let mut plan = runner
        .plan(&[document(
            r"
Feature: Isolation
  Scenario: first
    Given there are 2 cucumbers
  Scenario: second
    When I eat 1 cucumbers
",
        )])
        .expect("plan");

    let _ = runner.run(&mut plan);

    assert_eq!(case(&plan, "first").result(), Some(Outcome::Passed));
    let second = case(&plan, "second");
    assert_eq!(second.result(), Some(Outcome::Error));
    assert_eq!(second.message(), Some("no basket"));
}

#[test]
fn durations_come_from_the_clock() {
    let clock = Arc::new(ManualClock::new(SystemTime::UNIX_EPOCH));
    let log = Log::default();
    let ticking = Arc::clone(&clock);
    let kitchen = Kitchen::new(&log).with_step(StepDefinition::new(
        "wait",
        "I wait {seconds:integer} seconds",
        move |_, args| {
            let seconds = args.value::<i64>("seconds")?;
            ticking.advance(Duration::from_secs(seconds.unsigned_abs()));
            Ok(())
        },
    ));
    let runner = Runner::new(&registry(kitchen), &Configuration::empty())
        .expect("runner")
        .with_clock(clock);
    let mut plan = runner
        .plan(&[document(
            r"
Feature: Patience
  Scenario: slow
    Given I wait 60 seconds
    And I wait 60 seconds
    And I wait 60 seconds
    And I wait 60 seconds
    And I wait 60 seconds
",
        )])
        .expect("plan");

    let _ = runner.run(&mut plan);

    let slow = case(&plan, "slow");
    assert_eq!(slow.duration(), Some(Duration::from_secs(300)));
    assert_eq!(slow.start_instant(), Some(SystemTime::UNIX_EPOCH));
    assert!(slow
        .leaves()
        .all(|l| l.duration() == Some(Duration::from_secs(60))));
    assert_eq!(plan.duration(), Some(Duration::from_secs(300)));
}

#[test]
fn ambiguous_steps_fail_planning() {
    let log = Log::default();
    let invoked = Log::default();
    let kitchen = Kitchen::new(&log).with_step({
        let invoked = invoked.clone();
        StepDefinition::new("fill-again", "there are {count:integer} cucumbers", move |_, _| {
            invoked.lock().push("fill again".to_owned());
            Ok(())
        })
    });
    let runner =
        Runner::new(&registry(kitchen), &Configuration::empty()).expect("runner");

    let err = runner.plan(&[document(CUCUMBERS)]).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StepResolution);
    assert!(err.to_string().contains("ambiguous"), "{err}");
    assert!(log.lock().is_empty());
    assert!(invoked.lock().is_empty());
}

#[test]
fn hooks_wrap_every_test_case() {
    let log = Log::default();
    let (first, second, teardown) = (log.clone(), log.clone(), log.clone());
    let kitchen = Kitchen::new(&log)
        .with_hook(Hook::setup("second", 2, move |_| {
            second.lock().push("setup 2".to_owned());
            Ok(())
        }))
        .with_hook(Hook::teardown("clean", 0, move |_| {
            teardown.lock().push("teardown".to_owned());
            Ok(())
        }))
        .with_hook(Hook::setup("first", 1, move |_| {
            first.lock().push("setup 1".to_owned());
            Ok(())
        }));
    let runner =
        Runner::new(&registry(kitchen), &Configuration::empty()).expect("runner");
    let mut plan = runner
        .plan(&[document(
            r"
Feature: Hooks
  Scenario: one
    Given there are 1 cucumbers
  Scenario: two
    Given the kitchen catches fire
",
        )])
        .expect("plan");

    let _ = runner.run(&mut plan);

    assert_eq!(
        *log.lock(),
        [
            "setup 1", "setup 2", "fill 1", "teardown", //
            "setup 1", "setup 2", "fire", "teardown",
        ],
    );
}

#[test]
fn failing_setup_skips_steps_but_not_teardown() {
    let log = Log::default();
    let teardown = log.clone();
    let kitchen = Kitchen::new(&log)
        .with_hook(Hook::setup("broken", 0, |_| anyhow::bail!("no power")))
        .with_hook(Hook::teardown("clean", 0, move |_| {
            teardown.lock().push("teardown".to_owned());
            Ok(())
        }));
    let runner =
        Runner::new(&registry(kitchen), &Configuration::empty()).expect("runner");
    let mut plan = runner.plan(&[document(CUCUMBERS)]).expect("plan");

    let _ = runner.run(&mut plan);

    let counting = case(&plan, "counting");
    assert_eq!(
        results(counting),
        [Some(Outcome::Error), Some(Outcome::Skipped), Some(Outcome::Skipped)],
    );
    assert!(counting
        .message()
        .is_some_and(|m| m.contains("setup hook `broken` failed: no power")));
    assert_eq!(*log.lock(), ["teardown", "teardown", "teardown"]);
}

#[test]
fn failing_teardown_escalates_the_last_step() {
    let log = Log::default();
    let kitchen = Kitchen::new(&log)
        .with_hook(Hook::teardown("leaky", 0, |_| anyhow::bail!("sink leaks")));
    let runner =
        Runner::new(&registry(kitchen), &Configuration::empty()).expect("runner");
    let mut plan = runner
        .plan(&[document(
            r"
Feature: Cleanup
  Scenario: dirty
    Given there are 4 cucumbers
    When I eat 1 cucumbers
",
        )])
        .expect("plan");

    let _ = runner.run(&mut plan);

    let dirty = case(&plan, "dirty");
    assert_eq!(results(dirty), [Some(Outcome::Passed), Some(Outcome::Error)]);
    assert!(dirty
        .leaves()
        .last()
        .and_then(PlanNode::message)
        .is_some_and(|m| m.contains("sink leaks")));
}

#[test]
fn fail_fast_skips_remaining_test_cases() {
    let log = Log::default();
    let config = Configuration::from_pairs([("execution.failFast", "true")]);
    let runner = Runner::new(&registry(Kitchen::new(&log)), &config).expect("runner");
    let mut plan = runner
        .plan(&[document(
            r"
Feature: Fast
  Scenario: burning
    Given the kitchen catches fire
  Scenario: never
    Given there are 1 cucumbers
    When I eat 1 cucumbers
",
        )])
        .expect("plan");

    assert_eq!(runner.run(&mut plan), Some(Outcome::Error));

    let never = case(&plan, "never");
    assert_eq!(results(never), [Some(Outcome::Skipped), Some(Outcome::Skipped)]);
    assert_eq!(never.duration(), None);
    assert_eq!(*log.lock(), ["fire"]);
}

#[test]
fn events_follow_the_run() {
    let log = Log::default();
    let runner = Runner::new(&registry(Kitchen::new(&log)), &Configuration::empty())
        .expect("runner");
    let recorder = Arc::new(Recorder::new());
    let _ = runner.dispatcher().subscribe(recorder.clone());

    let mut plan = runner
        .plan(&[document(
            r"
Feature: Events
  Scenario: single
    Given there are 1 cucumbers
",
        )])
        .expect("plan");
    let _ = runner.run(&mut plan);

    let feature = plan.children[0].id.clone();
    let single = case(&plan, "single").id.clone();
    let step = format!("{single}#1");
    assert_eq!(
        recorder.events(),
        [
            (EventKind::PlanCreated, "plan".to_owned()),
            (EventKind::PlanRunStarted, "plan".to_owned()),
            (EventKind::NodeRunStarted, feature.clone()),
            (EventKind::NodeRunStarted, single.clone()),
            (EventKind::NodeRunStarted, step.clone()),
            (EventKind::NodeRunFinished, step),
            (EventKind::NodeRunFinished, single),
            (EventKind::NodeRunFinished, feature),
            (EventKind::PlanRunFinished, "plan".to_owned()),
        ],
    );
}

#[derive(Default)]
struct Summary {
    seen: Mutex<Vec<(usize, Option<Outcome>)>>,
}

impl Reporter for Summary {
    fn report(
        &self,
        plan: &PlanNode,
        _: &Configuration,
    ) -> anyhow::Result<()> {
        let leaves = plan
            .leaves()
            .filter(|l| l.node_type == NodeType::Step)
            .count();
        self.seen.lock().push((leaves, plan.result()));
        Ok(())
    }
}

struct Broken;

impl Reporter for Broken {
    fn report(&self, _: &PlanNode, _: &Configuration) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

#[test]
fn reporters_receive_the_result_tree() {
    let log = Log::default();
    let registry = registry(Kitchen::new(&log));
    let summary = Arc::new(Summary::default());
    for (name, reporter) in [
        ("broken", Arc::new(Broken) as Arc<dyn Reporter>),
        ("summary", summary.clone() as Arc<dyn Reporter>),
    ] {
        let _ = registry.register_one(Registration::new(
            ExtensionDescriptor::new("test", name, &extension::REPORTER),
            move || Instance::new(Arc::clone(&reporter)),
        ));
    }
    let runner = Runner::new(&registry, &Configuration::empty()).expect("runner");
    let mut plan = runner.plan(&[document(CUCUMBERS)]).expect("plan");

    let _ = runner.run(&mut plan);

    assert_eq!(*summary.seen.lock(), [(6, Some(Outcome::Undefined))]);
}
