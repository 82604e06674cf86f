use std::sync::{Arc, Weak};

use switchboard_core::{ServiceLookup, ServiceObject};
use switchboard_framework::{
    Container, Dependency, Module, ModuleBase, ModuleResult, ModuleState, Permissions, TrackInfo,
};

trait Roster: Send + Sync {
    fn size(&self) -> usize;
}

struct RosterModule {
    base: ModuleBase,
}

impl Roster for RosterModule {
    fn size(&self) -> usize {
        3
    }
}

impl Module for RosterModule {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn initialize(&self, container: &Container) -> ModuleResult<()> {
        self.base.initialize(container)
    }

    fn start(&self) -> ModuleResult<()> {
        self.base.start()
    }

    fn stop(&self) -> ModuleResult<()> {
        self.base.stop()
    }
}

fn roster_module() -> Arc<RosterModule> {
    Arc::new_cyclic(|this: &Weak<RosterModule>| RosterModule {
        base: ModuleBase::builder("roster")
            .publish_self(this.clone(), |module| {
                ServiceObject::new(module.clone())
                    .with::<dyn Roster>(module.clone())
                    .with::<dyn Module>(module)
            })
            .build(),
    })
}

struct Presence {
    base: ModuleBase,
    roster: Dependency<dyn Roster>,
}

fn presence_module() -> Presence {
    let roster = Dependency::new();
    Presence {
        base: ModuleBase::builder("presence")
            .track(TrackInfo::new().slot::<dyn Roster, _>("roster", roster.clone()))
            .build(),
        roster,
    }
}

#[test]
fn test_dependency_follows_publisher_lifecycle() {
    let container = Container::builder(ServiceLookup::new()).build();
    let roster = roster_module();
    let presence = presence_module();

    presence.base.initialize(&container).unwrap();
    presence.base.start().unwrap();
    assert!(presence.roster.get().is_none());

    roster.initialize(&container).unwrap();
    roster.start().unwrap();
    assert_eq!(presence.roster.get().unwrap().size(), 3);

    roster.stop().unwrap();
    assert!(presence.roster.get().is_none());
    assert_eq!(roster.base.state(), ModuleState::Stopped);

    roster.initialize(&container).unwrap();
    roster.start().unwrap();
    assert!(presence.roster.get().is_some());

    presence.base.stop().unwrap();
    assert!(presence.roster.get().is_none());
}

#[test]
fn test_initialize_without_lookup_permission_fails() {
    let container = Container::builder(ServiceLookup::new())
        .build()
        .restricted(Permissions::SERVICES);
    let presence = presence_module();
    assert!(presence.base.initialize(&container).is_err());
    assert_eq!(presence.base.state(), ModuleState::Constructed);
}
