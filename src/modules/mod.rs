pub mod categories;
pub mod tasks;
pub mod users;

use taskdb_kernel::ModuleRegistry;

/// Register the task manager's collections in creation order.
pub fn register_all(registry: &mut ModuleRegistry) -> anyhow::Result<()> {
    registry.register(users::create_module())?;
    registry.register(tasks::create_module())?;
    registry.register(categories::create_module())?;
    Ok(())
}
