use persistence_bridge::{
    discover_modules, ExtenderConfig, LoggingFactory, ModuleId, ModuleRegistry,
    PersistenceTracker, TrackingState,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const ORDERS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<persistence xmlns="http://xmlns.jcp.org/xml/ns/persistence" version="2.1">
  <persistence-unit name="orders" transaction-type="JTA">
    <jta-data-source>jdbc/orders</jta-data-source>
    <properties>
      <property name="hibernate.hbm2ddl.auto" value="validate"/>
    </properties>
  </persistence-unit>
</persistence>"#;

fn write_module(parent: &Path, dir: &str, manifest: &str, files: &[(&str, &str)]) -> anyhow::Result<()> {
    let root = parent.join(dir);
    fs::create_dir_all(&root)?;
    fs::write(root.join("module.toml"), manifest)?;
    for (path, content) in files {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full_path, content)?;
    }
    Ok(())
}

#[test]
fn test_directory_modules_end_to_end() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    write_module(
        temp_dir.path(),
        "orders",
        "id = 20\nname = \"org.example.orders\"\n\n[headers]\nmeta-persistence = \"META-INF/orders.xml\"\n",
        &[("META-INF/orders.xml", ORDERS_XML)],
    )?;
    write_module(
        temp_dir.path(),
        "defaulted",
        "id = 21\nname = \"org.example.defaulted\"\n",
        &[("META-INF/persistence.xml", ORDERS_XML)],
    )?;
    write_module(
        temp_dir.path(),
        "escape",
        "id = 22\nname = \"org.example.escape\"\n\n[headers]\nMeta-Persistence = \"../orders/META-INF/orders.xml\"\n",
        &[],
    )?;
    write_module(temp_dir.path(), "plain", "id = 23\nname = \"org.example.plain\"\n", &[])?;

    let registry = Arc::new(ModuleRegistry::new());
    for module in discover_modules(temp_dir.path())? {
        registry.install(Arc::new(module));
    }

    let factory = Arc::new(LoggingFactory::new("location"));
    let tracker = Arc::new(PersistenceTracker::new(
        ExtenderConfig::default(),
        factory.clone(),
    ));
    tracker.open(registry.clone())?;

    assert_eq!(tracker.state(ModuleId(20)), TrackingState::Tracked);
    assert_eq!(tracker.state(ModuleId(21)), TrackingState::Tracked);
    assert_eq!(tracker.state(ModuleId(22)), TrackingState::Ignored);
    assert_eq!(tracker.state(ModuleId(23)), TrackingState::Ignored);
    assert_eq!(factory.live_instances(), 2);

    let orders = tracker
        .persistent_module(ModuleId(20))
        .expect("orders should be tracked");
    let unit = orders.units().iter().next().expect("one unit");
    assert_eq!(unit.jta_data_source.as_deref(), Some("jdbc/orders"));
    assert_eq!(unit.property("hibernate.hbm2ddl.auto"), Some("validate"));
    assert_eq!(unit.property("location"), Some("META-INF/orders.xml"));

    for id in registry.module_ids() {
        registry.uninstall(id);
    }
    tracker.close();

    assert_eq!(factory.live_instances(), 0);
    assert!(tracker.tracked_modules().is_empty());

    Ok(())
}

#[test]
fn test_config_file_changes_discovery() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("bridge.toml");
    fs::write(
        &config_path,
        r#"
[discovery]
header = "X-Persistence"
default_location = "persistence/units.xml"
location_property = "origin"

[logging]
level = "debug"
"#,
    )?;
    let modules_dir = temp_dir.path().join("modules");
    write_module(
        &modules_dir,
        "a",
        "id = 1\nname = \"a\"\n",
        &[("persistence/units.xml", ORDERS_XML)],
    )?;

    let config = ExtenderConfig::from_file(&config_path)?;
    let registry = Arc::new(ModuleRegistry::new());
    for module in discover_modules(&modules_dir)? {
        registry.install(Arc::new(module));
    }
    let tracker = Arc::new(PersistenceTracker::new(
        config,
        Arc::new(LoggingFactory::new("origin")),
    ));
    tracker.open(registry)?;

    let persistent = tracker
        .persistent_module(ModuleId(1))
        .expect("module should be tracked");
    let unit = persistent.units().iter().next().expect("one unit");
    assert_eq!(unit.property("origin"), Some("persistence/units.xml"));
    assert_eq!(unit.property("location"), None);

    Ok(())
}
