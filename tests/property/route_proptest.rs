//! Property-based tests for route address resolution

use cinder::backend::realtime::router::{EventTarget, RouteAddress};
use cinder::backend::realtime::{handler, Controller, ControllerRegistry, EventRouter};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,8}"
}

fn registry() -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    registry.register(
        "Chat",
        Controller::new().action("send", handler(|_, _| async {})),
    );
    registry.register_in_module(
        "admin",
        "Users",
        Controller::new().action("kick", handler(|_, _| async {})),
    );
    registry
}

proptest! {
    #[test]
    fn test_fewer_than_two_segments_never_parse(name in segment()) {
        prop_assert!(RouteAddress::parse(&name).is_none());
    }

    #[test]
    fn test_empty_segment_never_parses(a in segment(), b in segment()) {
        let leading = format!(".{}.{}", a, b);
        let doubled = format!("{}..{}", a, b);
        let trailing = format!("{}.{}.", a, b);
        prop_assert!(RouteAddress::parse(&leading).is_none());
        prop_assert!(RouteAddress::parse(&doubled).is_none());
        prop_assert!(RouteAddress::parse(&trailing).is_none());
    }

    #[test]
    fn test_module_controller_and_action_positions(
        segments in prop::collection::vec(segment(), 3..7),
    ) {
        let address = RouteAddress::parse(&segments.join(".")).unwrap();
        prop_assert_eq!(address.module.as_deref(), Some(segments[0].as_str()));
        prop_assert_eq!(&address.controller, &segments[1]);
        prop_assert_eq!(&address.action, segments.last().unwrap());
    }

    #[test]
    fn test_resolution_is_idempotent(
        addresses in prop::collection::vec(
            prop_oneof![
                Just("Chat.send".to_string()),
                Just("admin.Users.kick".to_string()),
                Just("Chat.missing".to_string()),
                segment(),
                (segment(), segment()).prop_map(|(c, a)| format!("{}.{}", c, a)),
            ],
            0..12,
        ),
    ) {
        let routes: Vec<(String, EventTarget)> = addresses
            .iter()
            .enumerate()
            .map(|(i, address)| (format!("event{}", i), EventTarget::Address(address.clone())))
            .collect();
        let registry = registry();

        let (first, first_errors) = EventRouter::resolve(routes.clone(), &registry);
        let (second, second_errors) = EventRouter::resolve(routes, &registry);

        prop_assert_eq!(first.events(), second.events());
        prop_assert_eq!(first_errors.len(), second_errors.len());
        prop_assert_eq!(first.len() + first_errors.len(), addresses.len());
    }
}
