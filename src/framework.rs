//! Component and plugin registry
//!
//! Components declare the components they are composed from ("mixins").
//! Building a component validates the whole mixin graph first, then builds
//! every mixin depth-first and hands the built instances to the creator,
//! which takes ownership of them. Plugins have no mixins and receive only the
//! messages they declare.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::LayoutMode;
use crate::data::{EventStreamConnector, HttpTransport, Transport};
use crate::error::{FrameworkError, TransportError};
use crate::layout::{
    Layout, PagedLayout, PresentationLayout, PresentationTwoPageLayout, TextLayout,
    VerticalLayout, VerticalSingleColumnLayout,
};
use crate::message::Message;
use crate::scope::Scope;

/// Type-erasure helpers for components
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Internal viewer module constructed through the framework
pub trait Component: AsAny {
    fn init(&mut self, _scope: &Scope) -> Result<(), FrameworkError> {
        Ok(())
    }

    /// Called for every message broadcast over the owning scope
    fn on_message(&mut self, _scope: &Scope, _message: &Message) {}

    fn destroy(&mut self) {}

    fn as_layout(&self) -> Option<&dyn Layout> {
        None
    }

    fn as_layout_mut(&mut self) -> Option<&mut dyn Layout> {
        None
    }
}

/// Externally authored module subscribed to a subset of messages
pub trait Plugin {
    /// Names of the messages this plugin receives
    fn messages(&self) -> &[&str];

    fn init(&mut self, _scope: &Scope, _config: &serde_json::Value) -> Result<(), FrameworkError> {
        Ok(())
    }

    fn on_message(&mut self, scope: &Scope, message: &Message);

    fn destroy(&mut self) {}
}

/// Built mixins handed to a component creator
pub struct Mixins {
    component: String,
    built: Vec<(String, Box<dyn Component>)>,
}

impl Mixins {
    fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            built: Vec::new(),
        }
    }

    /// Take ownership of the mixin built for `name`
    pub fn take<T: Component>(&mut self, name: &str) -> Result<T, FrameworkError> {
        let index = self
            .built
            .iter()
            .position(|(mixin, _)| mixin == name)
            .ok_or_else(|| FrameworkError::MissingMixin {
                component: self.component.clone(),
                mixin: name.to_string(),
            })?;
        let (_, instance) = self.built.remove(index);
        instance
            .into_any()
            .downcast::<T>()
            .map(|instance| *instance)
            .map_err(|_| FrameworkError::MixinType {
                component: self.component.clone(),
                mixin: name.to_string(),
            })
    }
}

type ComponentCreator = Box<dyn Fn(&Scope, Mixins) -> Result<Box<dyn Component>, FrameworkError>>;
type PluginCreator = Box<dyn Fn(&Scope) -> Box<dyn Plugin>>;

struct ComponentDescriptor {
    mixins: Vec<String>,
    creator: ComponentCreator,
}

/// Built-in components
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    LayoutPaged,
    LayoutVertical,
    LayoutVerticalSingleColumn,
    LayoutPresentation,
    LayoutPresentationTwoPage,
    LayoutText,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 6] = [
        ComponentKind::LayoutPaged,
        ComponentKind::LayoutVertical,
        ComponentKind::LayoutVerticalSingleColumn,
        ComponentKind::LayoutPresentation,
        ComponentKind::LayoutPresentationTwoPage,
        ComponentKind::LayoutText,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::LayoutPaged => "layout-paged",
            ComponentKind::LayoutVertical => "layout-vertical",
            ComponentKind::LayoutVerticalSingleColumn => "layout-vertical-single-column",
            ComponentKind::LayoutPresentation => "layout-presentation",
            ComponentKind::LayoutPresentationTwoPage => "layout-presentation-two-page",
            ComponentKind::LayoutText => "layout-text",
        }
    }

    pub fn mixins(self) -> &'static [&'static str] {
        match self {
            ComponentKind::LayoutPaged => &[],
            ComponentKind::LayoutVertical | ComponentKind::LayoutPresentation => &["layout-paged"],
            ComponentKind::LayoutVerticalSingleColumn | ComponentKind::LayoutText => {
                &["layout-vertical"]
            }
            ComponentKind::LayoutPresentationTwoPage => &["layout-presentation"],
        }
    }

    pub fn for_layout(mode: LayoutMode) -> Self {
        match mode {
            LayoutMode::Vertical => ComponentKind::LayoutVertical,
            LayoutMode::VerticalSingleColumn => ComponentKind::LayoutVerticalSingleColumn,
            LayoutMode::Presentation => ComponentKind::LayoutPresentation,
            LayoutMode::PresentationTwoPage => ComponentKind::LayoutPresentationTwoPage,
            LayoutMode::Text => ComponentKind::LayoutText,
        }
    }

    fn create(self, mut mixins: Mixins) -> Result<Box<dyn Component>, FrameworkError> {
        let component: Box<dyn Component> = match self {
            ComponentKind::LayoutPaged => Box::new(PagedLayout::new()),
            ComponentKind::LayoutVertical => {
                Box::new(VerticalLayout::new(mixins.take("layout-paged")?))
            }
            ComponentKind::LayoutVerticalSingleColumn => {
                Box::new(VerticalSingleColumnLayout::new(mixins.take("layout-vertical")?))
            }
            ComponentKind::LayoutPresentation => {
                Box::new(PresentationLayout::new(mixins.take("layout-paged")?))
            }
            ComponentKind::LayoutPresentationTwoPage => Box::new(PresentationTwoPageLayout::new(
                mixins.take("layout-presentation")?,
            )),
            ComponentKind::LayoutText => Box::new(TextLayout::new(mixins.take("layout-vertical")?)),
        };
        Ok(component)
    }
}

/// Registry of components and plugins plus the transports they share.
///
/// Created once by the application entry point and shared by every viewer.
pub struct Framework {
    components: HashMap<String, ComponentDescriptor>,
    plugins: HashMap<String, PluginCreator>,
    transport: Arc<dyn Transport>,
    event_streams: Option<Arc<dyn EventStreamConnector>>,
}

impl Framework {
    /// Empty registry over `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            components: HashMap::new(),
            plugins: HashMap::new(),
            transport,
            event_streams: None,
        }
    }

    /// Registry with the built-in components over an HTTP transport
    pub fn http() -> Result<Self, TransportError> {
        let transport = Arc::new(HttpTransport::new()?);
        Ok(Self::new(transport.clone())
            .with_event_streams(transport)
            .with_builtins())
    }

    #[must_use]
    pub fn with_event_streams(mut self, connector: Arc<dyn EventStreamConnector>) -> Self {
        self.event_streams = Some(connector);
        self
    }

    #[must_use]
    pub fn with_builtins(mut self) -> Self {
        for kind in ComponentKind::ALL {
            self.add_component(kind.name(), kind.mixins(), move |_scope, mixins| {
                kind.create(mixins)
            });
        }
        self
    }

    pub fn add_component<F>(&mut self, name: &str, mixins: &[&str], creator: F)
    where
        F: Fn(&Scope, Mixins) -> Result<Box<dyn Component>, FrameworkError> + 'static,
    {
        let descriptor = ComponentDescriptor {
            mixins: mixins.iter().map(|mixin| (*mixin).to_string()).collect(),
            creator: Box::new(creator),
        };
        if self.components.insert(name.to_string(), descriptor).is_some() {
            warn!("Component '{name}' registered twice; keeping the latest");
        }
    }

    pub fn add_plugin<F>(&mut self, name: &str, creator: F)
    where
        F: Fn(&Scope) -> Box<dyn Plugin> + 'static,
    {
        if self
            .plugins
            .insert(name.to_string(), Box::new(creator))
            .is_some()
        {
            warn!("Plugin '{name}' registered twice; keeping the latest");
        }
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn event_streams(&self) -> Option<Arc<dyn EventStreamConnector>> {
        self.event_streams.clone()
    }

    /// Construction order for `name`: every mixin before its dependent.
    ///
    /// Fails on the first unregistered name or dependency cycle.
    pub fn resolve(&self, name: &str) -> Result<Vec<String>, FrameworkError> {
        let mut stack = Vec::new();
        let mut order = Vec::new();
        self.visit(name, None, &mut stack, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        required_by: Option<&str>,
        stack: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), FrameworkError> {
        if let Some(start) = stack.iter().position(|entry| entry == name) {
            let mut chain = stack[start..].to_vec();
            chain.push(name.to_string());
            return Err(FrameworkError::CyclicDependency { chain });
        }
        let descriptor =
            self.components
                .get(name)
                .ok_or_else(|| FrameworkError::UnregisteredComponent {
                    name: name.to_string(),
                    required_by: required_by.map(str::to_string),
                })?;

        stack.push(name.to_string());
        for mixin in &descriptor.mixins {
            self.visit(mixin, Some(name), stack, order)?;
        }
        stack.pop();
        order.push(name.to_string());
        Ok(())
    }

    pub(crate) fn build_component(
        &self,
        name: &str,
        scope: &Scope,
    ) -> Result<Box<dyn Component>, FrameworkError> {
        let order = self.resolve(name)?;
        debug!("Building '{name}' via {}", order.join(" -> "));
        self.construct(name, scope)
    }

    fn construct(&self, name: &str, scope: &Scope) -> Result<Box<dyn Component>, FrameworkError> {
        let descriptor =
            self.components
                .get(name)
                .ok_or_else(|| FrameworkError::UnregisteredComponent {
                    name: name.to_string(),
                    required_by: None,
                })?;

        let mut mixins = Mixins::new(name);
        for mixin in &descriptor.mixins {
            let instance = self.construct(mixin, scope)?;
            mixins.built.push((mixin.clone(), instance));
        }
        (descriptor.creator)(scope, mixins)
    }

    pub(crate) fn build_plugin(
        &self,
        name: &str,
        scope: &Scope,
    ) -> Result<Box<dyn Plugin>, FrameworkError> {
        let creator = self
            .plugins
            .get(name)
            .ok_or_else(|| FrameworkError::UnregisteredPlugin(name.to_string()))?;
        Ok(creator(scope))
    }
}
