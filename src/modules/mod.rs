pub mod books;
pub mod reviews;
pub mod users;

use shelf_kernel::ModuleRegistry;

use crate::context::AppContext;

/// Register every application module with the registry
pub fn register_all(registry: &mut ModuleRegistry, ctx: &AppContext) {
    registry.register(users::create_module(ctx.clone()));
    registry.register(books::create_module(ctx.clone()));
    registry.register(reviews::create_module(ctx.clone()));
}
