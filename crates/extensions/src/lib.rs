//! Custom block types for blockdoc. Everything here is registered through the
//! same plugin protocol the built-in types use; the core knows nothing about
//! these blocks.

mod accordion;
mod card_grid;
mod chart;
mod common;
mod diagram;
mod image_compare;
mod tabs;
mod timeline;

use blockdoc_core::{EditorPlugin, PluginRegistry, RegistryError};

pub use chart::{ChartAttrs, ChartData, ChartDataError, ChartType, Series, chart_attrs};
pub use diagram::{
    DiagramError, DiagramRenderer, RenderRequest, finish_render, render_now, request_render,
};

pub fn plugins() -> Vec<Box<dyn EditorPlugin>> {
    vec![
        Box::new(accordion::AccordionPlugin),
        Box::new(tabs::TabsPlugin),
        Box::new(timeline::TimelinePlugin),
        Box::new(card_grid::CardGridPlugin),
        Box::new(chart::ChartPlugin),
        Box::new(diagram::DiagramPlugin),
        Box::new(image_compare::ImageComparePlugin),
    ]
}

/// Adds every extension to `registry`. Stops at the first collision; the
/// plugins registered before it stay registered.
pub fn register_all(registry: &mut PluginRegistry) -> Result<(), RegistryError> {
    for plugin in plugins() {
        registry.register_plugin(plugin)?;
    }
    tracing::debug!(plugins = registry.plugin_ids().len(), "extensions registered");
    Ok(())
}

/// The built-in rich text set plus every extension.
pub fn registry() -> PluginRegistry {
    let mut registry = PluginRegistry::richtext();
    register_all(&mut registry).expect("extension registry must be valid");
    registry
}
