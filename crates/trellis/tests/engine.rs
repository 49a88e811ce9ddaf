use std::io::Write;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use trellis::{
	Arguments, CapabilityError, CapturedArgs, ComputeError, ConfigError, Engine, EngineConfig, EngineError, Helper, HelperCapabilities,
	HelperCapabilityOptions, HelperClass, HelperDefinition, HelperError, HelperManager, HelperResult, ManagerShape, ManagerTarget, MemoPolicy,
	NamedArgs, Owner, RegistryError, StateBucket, Tag, Value, ValueManager, classic_helper, classic_helper_target, create_tag, dirty_tag, helper,
	helper_capabilities,
};
use trellis_test_helpers::init_tracing;

/// Reads a tag owned by application state.
struct Clock {
	ticks: Tag,
	reads: i64,
}

impl Helper for Clock {
	fn compute(&mut self, _: &[Value], _: &NamedArgs) -> Result<Value, ComputeError> {
		self.ticks.consume();
		self.reads += 1;
		Ok(Value::Int(self.reads))
	}
}

fn clock(ticks: &Tag) -> HelperDefinition {
	let ticks = ticks.clone();
	classic_helper(HelperClass::new("clock", move |_| Clock {
		ticks: ticks.clone(),
		reads: 0,
	}))
}

#[test]
fn dirtying_application_state_invalidates_stateful_helpers() {
	init_tracing();
	let engine = Engine::new(EngineConfig::default()).unwrap();
	let ticks = create_tag();
	let mut invocation = engine.invoke(&clock(&ticks), None, Arguments::new()).unwrap().unwrap();

	assert_eq!(invocation.value().unwrap(), Value::Int(1));
	assert_eq!(invocation.value().unwrap(), Value::Int(1));

	engine.run(|| dirty_tag(&ticks)).unwrap();
	assert!(invocation.is_stale());
	assert_eq!(invocation.value().unwrap(), Value::Int(2));
}

#[test]
fn config_file_selects_the_memo_policy() {
	init_tracing();
	let mut file = tempfile::NamedTempFile::new().unwrap();
	writeln!(file, "label = \"app\"\nmemoize = \"never\"").unwrap();

	let engine = Engine::load(file.path()).unwrap();
	assert_eq!(engine.config().memoize, MemoPolicy::Never);
	assert_eq!(engine.registry().label(), "app");

	let ticks = create_tag();
	let mut invocation = engine.invoke(&clock(&ticks), None, Arguments::new()).unwrap().unwrap();
	assert_eq!(invocation.value().unwrap(), Value::Int(1));
	assert_eq!(invocation.value().unwrap(), Value::Int(2));
}

#[test]
fn missing_config_file_is_an_io_error() {
	let dir = tempfile::tempdir().unwrap();
	let err = Engine::load(dir.path().join("missing.toml")).unwrap_err();
	assert!(matches!(err, EngineError::Config(ConfigError::Io { .. })));
}

#[test]
fn invalid_config_is_rejected_before_building() {
	let config = EngineConfig {
		max_flush_tasks: 0,
		..EngineConfig::default()
	};
	assert!(matches!(Engine::new(config), Err(EngineError::Config(ConfigError::Invalid { .. }))));
}

/// Upper-cases its first positional argument.
struct ShoutManager {
	capabilities: HelperCapabilities,
}

impl ShoutManager {
	fn new() -> Result<Self, CapabilityError> {
		let options = HelperCapabilityOptions {
			has_value: true,
			..Default::default()
		};
		Ok(Self {
			capabilities: helper_capabilities("3.23", options)?,
		})
	}
}

impl HelperManager for ShoutManager {
	fn capabilities(&self) -> HelperCapabilities {
		self.capabilities
	}

	fn create_helper(&self, _: &HelperDefinition, args: &CapturedArgs) -> Result<StateBucket, HelperError> {
		Ok(StateBucket::new(args.clone()))
	}

	fn get_debug_name(&self, _: &HelperDefinition) -> String {
		"shout".into()
	}

	fn as_value(&self) -> Option<&dyn ValueManager> {
		Some(self)
	}
}

impl ValueManager for ShoutManager {
	fn get_value(&self, bucket: &StateBucket) -> HelperResult {
		let args = bucket.downcast_ref::<CapturedArgs>().ok_or(HelperError::ForeignBucket { manager: "shout" })?;
		let args = args.read();
		Ok(Value::from(args.get(0).map(|v| v.to_string().to_uppercase())))
	}
}

#[test]
fn custom_managers_join_the_registry() {
	let shout = HelperDefinition::new(());
	let mut builder = Engine::builder(EngineConfig::default()).unwrap();
	builder
		.set_manager(ManagerTarget::Exact(shout.id()), |_| {
			let manager: Arc<dyn HelperManager> = Arc::new(ShoutManager::new()?);
			Ok(manager)
		})
		.unwrap();
	let engine = builder.build();

	let mut invocation = engine.invoke(&shout, None, Arguments::positional(["hey"])).unwrap().unwrap();
	assert_eq!(invocation.value().unwrap(), Value::from("HEY"));
	assert_eq!(invocation.debug_name(), "shout");
	assert_eq!(invocation.manager().shape(), ManagerShape::Value);
}

#[test]
fn installed_targets_cannot_be_replaced() {
	let mut builder = Engine::builder(EngineConfig::default()).unwrap();
	let err = builder
		.set_manager_instance(classic_helper_target(), Arc::new(ShoutManager::new().unwrap()))
		.err()
		.unwrap();
	assert!(matches!(err, EngineError::Registry(RegistryError::DuplicateTarget(_))));
}

#[test]
fn classic_managers_are_per_owner_and_simple_is_shared() {
	let engine = Engine::new(EngineConfig::default()).unwrap();
	let app = Owner::new("app");

	let a = engine.classic_helper_manager(Some(&app)).unwrap().unwrap();
	let b = engine.classic_helper_manager(Some(&app)).unwrap().unwrap();
	let none = engine.classic_helper_manager(None).unwrap().unwrap();
	assert!(Arc::ptr_eq(&a, &b));
	assert!(!Arc::ptr_eq(&a, &none));
	assert_eq!(a.shape(), ManagerShape::ValueWithDestroyable);
	assert!(a.capabilities().has_destroyable());

	let simple = engine.simple_helper_manager();
	assert!(!simple.capabilities().has_destroyable());
}

#[test]
fn function_helpers_through_the_engine() {
	let engine = Engine::new(EngineConfig::default()).unwrap();
	let join = helper("join", |positional, named| {
		let separator = named.get("with").and_then(Value::as_str).unwrap_or(",").to_owned();
		let parts: Vec<String> = positional.iter().map(Value::to_string).collect();
		Ok(Value::from(parts.join(&separator)))
	});

	let mut invocation = engine
		.invoke(&join, None, Arguments::positional(["a", "b"]).with_named("with", "-"))
		.unwrap()
		.unwrap();
	assert_eq!(invocation.value().unwrap(), Value::from("a-b"));

	engine.run(|| invocation.update_args(Arguments::positional(["x", "y", "z"]))).unwrap();
	assert!(invocation.is_stale());
	assert_eq!(invocation.value().unwrap(), Value::from("x,y,z"));
}
