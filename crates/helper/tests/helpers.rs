use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use trellis_helper::{
	Helper, HelperClass, HelperContext, MemoPolicy, RecomputeHandle, SimpleClassicHelperManager, classic_helper, factory_helper, helper, install,
};
use trellis_manager::{
	Arguments, ComputeError, HelperDefinition, HelperError, HelperInvocation, ManagerRegistry, ManagerRegistryBuilder, NamedArgs, Value,
};
use trellis_owner::Owner;
use trellis_runloop::RunLoop;
use trellis_test_helpers::{init_tracing, run_destroy, run_loop_settled, run_task, run_task_next};

fn registry(run_loop: &RunLoop, memo: MemoPolicy) -> ManagerRegistry {
	init_tracing();
	let mut builder = ManagerRegistryBuilder::new("helpers");
	install(&mut builder, run_loop, memo, Arc::new(SimpleClassicHelperManager::new().unwrap())).unwrap();
	builder.freeze()
}

fn format_currency() -> HelperDefinition {
	helper("format-currency", |positional, named| {
		let cents = positional.first().and_then(Value::as_f64).unwrap_or_default();
		let currency = named.get("currency").map(Value::to_string).unwrap_or_default();
		Ok(Value::from(format!("{currency}{}", cents / 100.0)))
	})
}

fn invoke(registry: &ManagerRegistry, def: &HelperDefinition, owner: Option<&Owner>, args: Arguments) -> HelperInvocation {
	HelperInvocation::new(registry, def, owner, args).unwrap().unwrap()
}

struct Counter {
	count: i64,
	computes: Arc<AtomicUsize>,
}

impl Helper for Counter {
	fn compute(&mut self, _: &[Value], _: &NamedArgs) -> Result<Value, ComputeError> {
		self.computes.fetch_add(1, Ordering::SeqCst);
		let current = self.count;
		self.count += 1;
		Ok(Value::Int(current))
	}
}

/// Builds a counter class and hands out each instance's recompute handle.
fn counter() -> (HelperDefinition, Arc<AtomicUsize>, Arc<parking_lot::Mutex<Vec<RecomputeHandle>>>) {
	let computes = Arc::new(AtomicUsize::new(0));
	let handles = Arc::new(parking_lot::Mutex::new(Vec::new()));
	let class = {
		let computes = Arc::clone(&computes);
		let handles = Arc::clone(&handles);
		HelperClass::new("counter", move |cx: HelperContext| {
			handles.lock().push(cx.recompute_handle());
			Counter {
				count: 0,
				computes: Arc::clone(&computes),
			}
		})
	};
	(classic_helper(class), computes, handles)
}

#[test]
fn function_helper_formats_currency() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::default());
	let def = format_currency();

	let mut first = invoke(&registry, &def, None, Arguments::positional([230]).with_named("currency", "$"));
	let mut second = invoke(&registry, &def, None, Arguments::positional([100]).with_named("currency", "$"));

	assert_eq!(first.value().unwrap(), Value::from("$2.3"));
	assert_eq!(second.value().unwrap(), Value::from("$1"));
	assert_eq!(first.value().unwrap(), Value::from("$2.3"));
	assert_eq!(first.debug_name(), "format-currency");
	assert!(first.destroyable().unwrap().is_none());
}

#[test]
fn function_helper_buckets_are_isolated() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::default());
	let def = helper("echo", |positional, _| Ok(Value::List(positional.to_vec())));

	let (mut a, mut b) = run_task(&run_loop, || {
		(
			invoke(&registry, &def, None, Arguments::positional([1])),
			invoke(&registry, &def, None, Arguments::positional([2, 3])),
		)
	});
	a.update_args(Arguments::positional([9]));

	assert_eq!(a.value().unwrap(), Value::from(vec![9]));
	assert_eq!(b.value().unwrap(), Value::from(vec![2, 3]));
}

#[test]
fn counter_recomputes_only_when_asked() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::PerRevision);
	let (def, computes, handles) = counter();
	let mut invocation = invoke(&registry, &def, None, Arguments::new());

	assert_eq!(invocation.value().unwrap(), Value::Int(0));
	assert!(!invocation.is_stale());

	run_task(&run_loop, || handles.lock()[0].recompute().unwrap());
	assert!(invocation.is_stale());
	assert_eq!(invocation.value().unwrap(), Value::Int(1));
	assert_eq!(invocation.value().unwrap(), Value::Int(1));
	assert_eq!(invocation.value().unwrap(), Value::Int(1));
	assert_eq!(computes.load(Ordering::SeqCst), 2);
}

#[test]
fn never_policy_counts_every_read() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::Never);
	let (def, computes, _) = counter();
	let mut invocation = invoke(&registry, &def, None, Arguments::new());

	let values: Vec<_> = (0..3).map(|_| invocation.value().unwrap()).collect();
	assert_eq!(values, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
	assert_eq!(computes.load(Ordering::SeqCst), 3);
}

#[test]
fn recomputes_in_one_batch_coalesce() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::PerRevision);
	let (def, computes, handles) = counter();
	let mut invocation = invoke(&registry, &def, None, Arguments::new());
	invocation.value().unwrap();

	let ((), report) = run_loop
		.run_reported(|| {
			let handle = handles.lock()[0].clone();
			for _ in 0..5 {
				handle.recompute().unwrap();
			}
		})
		.unwrap();

	assert_eq!(report.executed, 1);
	assert_eq!(report.coalesced, 4);
	assert_eq!(invocation.value().unwrap(), Value::Int(1));
	assert_eq!(computes.load(Ordering::SeqCst), 2);
}

#[test]
fn deferred_recompute_applies_once_settled() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::PerRevision);
	let (def, _, handles) = counter();
	let mut invocation = invoke(&registry, &def, None, Arguments::new());
	invocation.value().unwrap();

	let handle = handles.lock()[0].clone();
	run_task_next(&run_loop, move || handle.recompute().unwrap());
	assert!(!invocation.is_stale());

	let report = run_loop_settled(&run_loop);
	assert_eq!(report.executed, 2);
	assert_eq!(invocation.value().unwrap(), Value::Int(1));
}

#[derive(Debug)]
struct Session {
	user: &'static str,
}

/// Reports whether the constructor saw an owner, and the session user.
struct CurrentUser {
	constructed_with_owner: bool,
	session: Option<Arc<Session>>,
}

impl CurrentUser {
	fn class() -> HelperClass {
		HelperClass::new("current-user", |cx: HelperContext| CurrentUser {
			constructed_with_owner: cx.owner().is_some(),
			session: cx.owner().and_then(|owner| owner.lookup::<Session>("service:session")),
		})
	}
}

impl Helper for CurrentUser {
	fn compute(&mut self, _: &[Value], _: &NamedArgs) -> Result<Value, ComputeError> {
		let user = self.session.as_ref().map(|session| session.user);
		Ok(Value::from(vec![Value::from(self.constructed_with_owner), Value::from(user)]))
	}

	fn inject(&mut self, owner: &Owner) {
		self.session = owner.lookup::<Session>("service:session");
	}
}

fn app_owner() -> Owner {
	let owner = Owner::new("app");
	owner.register("service:session", Session { user: "tomster" }).unwrap();
	owner
}

#[test]
fn class_definitions_get_owner_injection() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::default());
	let owner = app_owner();

	let mut invocation = invoke(&registry, &classic_helper(CurrentUser::class()), Some(&owner), Arguments::new());
	assert_eq!(invocation.value().unwrap(), Value::from(vec![Value::from(true), Value::from("tomster")]));
}

#[test]
fn factory_definitions_are_injected_by_the_container() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::default());
	let owner = app_owner();
	owner.register_factory("helper:current-user", CurrentUser::class()).unwrap();
	let factory = owner.factory_for::<HelperClass>("helper:current-user").unwrap();

	let mut invocation = invoke(&registry, &factory_helper(factory), Some(&owner), Arguments::new());
	assert_eq!(invocation.value().unwrap(), Value::from(vec![Value::from(false), Value::from("tomster")]));
	assert_eq!(invocation.debug_name(), "current-user");
}

#[test]
fn class_definitions_without_owner_see_none() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::default());
	let mut invocation = invoke(&registry, &classic_helper(CurrentUser::class()), None, Arguments::new());
	assert_eq!(invocation.value().unwrap(), Value::from(vec![Value::from(false), Value::Null]));
}

#[derive(Debug, PartialEq)]
struct Overdrawn(i64);

impl fmt::Display for Overdrawn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "balance {} is below zero", self.0)
	}
}

impl std::error::Error for Overdrawn {}

#[test]
fn compute_errors_propagate_unmodified() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::default());
	let def = helper("balance", |positional, _| {
		let balance = positional.first().and_then(Value::as_int).unwrap_or_default();
		if balance < 0 {
			return Err(ComputeError::new(Overdrawn(balance)));
		}
		Ok(Value::Int(balance))
	});

	let mut invocation = invoke(&registry, &def, None, Arguments::positional([-5]));
	let HelperError::Compute(err) = invocation.value().unwrap_err() else {
		panic!("expected a compute error");
	};
	assert_eq!(err.downcast_ref::<Overdrawn>(), Some(&Overdrawn(-5)));
	assert!(invocation.is_stale());

	invocation.update_args(Arguments::positional([5]));
	assert_eq!(invocation.value().unwrap(), Value::Int(5));
}

#[test]
fn destroying_a_stateful_helper_stops_it() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::default());
	let (def, _, handles) = counter();
	let mut invocation = invoke(&registry, &def, None, Arguments::new());
	invocation.value().unwrap();

	let destroyable = invocation.destroyable().unwrap();
	run_destroy(&run_loop, destroyable.as_ref());
	assert!(destroyable.unwrap().is_destroyed());

	assert!(matches!(invocation.value(), Err(HelperError::Destroyed { .. })));
	handles.lock()[0].recompute().unwrap();
	assert!(!run_loop.has_pending());
}

#[test]
fn classic_managers_are_built_per_owner() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::default());
	let (def, ..) = counter();
	let app = Owner::new("app");
	let other = Owner::new("other");

	let a = registry.get_manager(&def, Some(&app)).unwrap().unwrap();
	let b = registry.get_manager(&def, Some(&app)).unwrap().unwrap();
	let c = registry.get_manager(&def, Some(&other)).unwrap().unwrap();
	assert!(Arc::ptr_eq(&a, &b));
	assert!(!Arc::ptr_eq(&a, &c));

	let simple = format_currency();
	let s1 = registry.get_manager(&simple, Some(&app)).unwrap().unwrap();
	let s2 = registry.get_manager(&simple, Some(&other)).unwrap().unwrap();
	assert!(Arc::ptr_eq(&s1, &s2));
}

#[test]
fn unknown_definitions_are_not_helpers() {
	let run_loop = RunLoop::new();
	let registry = registry(&run_loop, MemoPolicy::default());
	let def = HelperDefinition::new("not a helper");
	assert!(HelperInvocation::new(&registry, &def, None, Arguments::new()).unwrap().is_none());
}
