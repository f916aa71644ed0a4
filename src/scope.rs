//! Per-viewer context: message routing, shared config and lifecycle
//!
//! Everything in a scope lives on the viewer's thread. Broadcasting from a
//! handler does not recurse: the message is queued and delivered once the
//! current delivery has finished.

use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use log::{debug, warn};

use crate::config::{Config, SharedConfig};
use crate::data::DataProvider;
use crate::error::{AssetError, FrameworkError};
use crate::framework::{Component, Framework, Plugin};
use crate::message::Message;
use crate::promise::Promise;

/// Shared handle to a component created in a scope
pub type ComponentHandle = Rc<RefCell<Box<dyn Component>>>;

/// Shared handle to a loaded plugin
pub type PluginHandle = Rc<RefCell<Box<dyn Plugin>>>;

/// Per-scope singleton constructed on first use
pub trait Utility: Any {
    fn create(framework: &Framework, scope: &Scope) -> Self
    where
        Self: Sized;
}

enum Registered {
    Component(ComponentHandle),
    Plugin(PluginHandle),
}

struct Entry {
    name: String,
    instance: Registered,
}

pub struct Scope {
    framework: Rc<Framework>,
    config: SharedConfig,
    entries: RefCell<Vec<Entry>>,
    utilities: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    data_providers: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    provider_teardown: RefCell<Vec<Box<dyn Fn()>>>,
    queue: RefCell<VecDeque<Message>>,
    dispatching: Cell<bool>,
    destroyed: Cell<bool>,
}

impl Scope {
    pub fn new(framework: Rc<Framework>, config: Config) -> Self {
        Self {
            framework,
            config: config.shared(),
            entries: RefCell::new(Vec::new()),
            utilities: RefCell::new(HashMap::new()),
            data_providers: RefCell::new(HashMap::new()),
            provider_teardown: RefCell::new(Vec::new()),
            queue: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
            destroyed: Cell::new(false),
        }
    }

    pub fn framework(&self) -> &Rc<Framework> {
        &self.framework
    }

    pub fn config(&self) -> Ref<'_, Config> {
        self.config.borrow()
    }

    /// Mutable access to the shared configuration.
    ///
    /// Do not hold the guard across a broadcast.
    pub fn config_mut(&self) -> RefMut<'_, Config> {
        self.config.borrow_mut()
    }

    pub fn shared_config(&self) -> SharedConfig {
        Rc::clone(&self.config)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Build, initialise and register the component `name`
    pub fn create_component(&self, name: &str) -> Result<ComponentHandle, FrameworkError> {
        if self.is_destroyed() {
            return Err(FrameworkError::ScopeDestroyed);
        }
        let mut component = self.framework.build_component(name, self)?;
        component.init(self)?;

        let handle: ComponentHandle = Rc::new(RefCell::new(component));
        self.entries.borrow_mut().push(Entry {
            name: name.to_string(),
            instance: Registered::Component(Rc::clone(&handle)),
        });
        debug!("Created component '{name}'");
        Ok(handle)
    }

    /// Destroy one component and stop routing messages to it
    pub fn destroy_component(&self, handle: &ComponentHandle) {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let position = entries.iter().position(|entry| match &entry.instance {
                Registered::Component(component) => Rc::ptr_eq(component, handle),
                Registered::Plugin(_) => false,
            });
            position.map(|index| entries.remove(index))
        };
        if let Some(entry) = removed {
            debug!("Destroying component '{}'", entry.name);
            handle.borrow_mut().destroy();
        }
    }

    /// Build, initialise and register the plugin `name`
    pub fn load_plugin(
        &self,
        name: &str,
        config: serde_json::Value,
    ) -> Result<PluginHandle, FrameworkError> {
        if self.is_destroyed() {
            return Err(FrameworkError::ScopeDestroyed);
        }
        let mut plugin = self.framework.build_plugin(name, self)?;
        plugin.init(self, &config)?;

        let handle: PluginHandle = Rc::new(RefCell::new(plugin));
        self.entries.borrow_mut().push(Entry {
            name: name.to_string(),
            instance: Registered::Plugin(Rc::clone(&handle)),
        });
        debug!("Loaded plugin '{name}'");
        Ok(handle)
    }

    /// Deliver `message` to every component and to subscribed plugins.
    ///
    /// Called while a delivery is in progress, the message is queued behind
    /// the ones already pending.
    pub fn broadcast(&self, message: Message) {
        if self.is_destroyed() {
            debug!("Dropping '{}' broadcast on destroyed scope", message.name());
            return;
        }
        self.queue.borrow_mut().push_back(message);
        if self.dispatching.replace(true) {
            return;
        }

        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(message) = next else {
                break;
            };
            self.deliver(&message);
        }
        self.dispatching.set(false);
    }

    fn deliver(&self, message: &Message) {
        // Snapshot so handlers may create components while we iterate
        let recipients: Vec<(String, Registered)> = self
            .entries
            .borrow()
            .iter()
            .map(|entry| {
                let instance = match &entry.instance {
                    Registered::Component(component) => {
                        Registered::Component(Rc::clone(component))
                    }
                    Registered::Plugin(plugin) => Registered::Plugin(Rc::clone(plugin)),
                };
                (entry.name.clone(), instance)
            })
            .collect();

        for (name, recipient) in recipients {
            if self.is_destroyed() {
                return;
            }
            match recipient {
                Registered::Component(component) => match component.try_borrow_mut() {
                    Ok(mut component) => component.on_message(self, message),
                    Err(_) => debug!("Skipping '{}' for busy component '{name}'", message.name()),
                },
                Registered::Plugin(plugin) => {
                    let Ok(mut plugin) = plugin.try_borrow_mut() else {
                        debug!("Skipping '{}' for busy plugin '{name}'", message.name());
                        continue;
                    };
                    if plugin.messages().iter().any(|name| *name == message.name()) {
                        plugin.on_message(self, message);
                    }
                }
            }
        }
    }

    /// Memoized utility of type `T`
    pub fn utility<T: Utility>(&self) -> Rc<T> {
        let key = TypeId::of::<T>();
        if let Some(existing) = self.utilities.borrow().get(&key) {
            if let Ok(utility) = Rc::clone(existing).downcast::<T>() {
                return utility;
            }
        }
        let utility = Rc::new(T::create(&self.framework, self));
        self.utilities
            .borrow_mut()
            .insert(key, Rc::clone(&utility) as Rc<dyn Any>);
        utility
    }

    /// Memoized data provider of type `P`
    pub fn data_provider<P: DataProvider>(&self) -> Rc<P> {
        let key = TypeId::of::<P>();
        if let Some(existing) = self.data_providers.borrow().get(&key) {
            if let Ok(provider) = Rc::clone(existing).downcast::<P>() {
                return provider;
            }
        }
        let provider = Rc::new(P::create(self));
        self.data_providers
            .borrow_mut()
            .insert(key, Rc::clone(&provider) as Rc<dyn Any>);
        let teardown = Rc::clone(&provider);
        self.provider_teardown
            .borrow_mut()
            .push(Box::new(move || teardown.destroy()));
        provider
    }

    /// Shorthand for `data_provider::<P>().get(key)`
    pub fn get<P: DataProvider>(&self, key: &P::Key) -> Promise<P::Asset, AssetError> {
        self.data_provider::<P>().get(key)
    }

    /// Tear down every component and plugin, newest first
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.queue.borrow_mut().clear();

        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        for entry in entries.into_iter().rev() {
            debug!("Destroying '{}'", entry.name);
            match entry.instance {
                Registered::Component(component) => match component.try_borrow_mut() {
                    Ok(mut component) => component.destroy(),
                    Err(_) => warn!("Component '{}' busy during destroy", entry.name),
                },
                Registered::Plugin(plugin) => match plugin.try_borrow_mut() {
                    Ok(mut plugin) => plugin.destroy(),
                    Err(_) => warn!("Plugin '{}' busy during destroy", entry.name),
                },
            }
        }

        let teardown = std::mem::take(&mut *self.provider_teardown.borrow_mut());
        for destroy in teardown.into_iter().rev() {
            destroy();
        }
        self.data_providers.borrow_mut().clear();
        self.utilities.borrow_mut().clear();
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.destroy();
    }
}
