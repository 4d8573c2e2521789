//! Hello Addin - A simple example addin for trellis
//!
//! This addin demonstrates:
//! - Basic addin structure with the `export_addin!` macro
//! - Registering extension factories the manifest refers to
//! - A composite factory that keeps its children in order
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! ```bash
//! mkdir -p ~/.local/share/trellis/addins/hello
//! cp addin.toml target/release/libhello_addin.so ~/.local/share/trellis/addins/hello/
//! trellis start --point main-menu
//! ```

use std::sync::Mutex;

use trellis_addin_api::{
    Addin, AddinError, BuildContext, ExtensionError, ExtensionFactory, ExtensionValue, TypeTable,
    export_addin, factory_fn,
};

/// A labelled menu whose entries are the labels of its children
pub struct Menu {
    pub label: String,
    entries: Mutex<Vec<String>>,
}

impl Menu {
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

struct MenuFactory;

impl ExtensionFactory for MenuFactory {
    fn create(&self, ctx: &BuildContext<'_>) -> Result<ExtensionValue, ExtensionError> {
        let label = ctx
            .config()
            .get::<String>("label")
            .unwrap_or_else(|| ctx.builder_id().to_string());
        ctx.log_debug(&format!("Creating menu '{label}'"));
        Ok(ExtensionValue::new(Menu {
            label,
            entries: Mutex::new(Vec::new()),
        }))
    }

    fn child_inserted(&self, parent: &ExtensionValue, index: usize, child: &ExtensionValue) {
        let (Some(menu), Some(entry)) = (parent.downcast_ref::<Menu>(), child.downcast_ref::<String>())
        else {
            return;
        };
        if let Ok(mut entries) = menu.entries.lock() {
            entries.insert(index.min(entries.len()), entry.clone());
        }
    }

    fn child_removed(&self, parent: &ExtensionValue, child: &ExtensionValue) {
        let (Some(menu), Some(entry)) = (parent.downcast_ref::<Menu>(), child.downcast_ref::<String>())
        else {
            return;
        };
        if let Ok(mut entries) = menu.entries.lock() {
            entries.retain(|e| e != entry);
        }
    }
}

/// Contributes a "Greetings" menu to the host's main menu
#[derive(Default)]
pub struct HelloAddin;

impl Addin for HelloAddin {
    fn register_types(&self, types: &mut TypeTable) -> Result<(), AddinError> {
        types.register_factory("Menu", MenuFactory)?;
        types.register_factory(
            "Item",
            factory_fn(|ctx| Ok(ExtensionValue::new(ctx.builder_id().to_string()))),
        )
    }
}

export_addin!(HelloAddin);
