//! Catalog fixtures shared across engine and API tests.

use std::collections::BTreeMap;

use waymark_catalog::model::{
    Catalog, Chapter, ContactRole, Roster, Rosters, Step, StepConfig,
};
use waymark_core::delivery::{Channel, Contact};
use waymark_core::ids::{ChapterId, StepId};
use waymark_geo::GeoPoint;

fn contact(name: &str, phone: &str, email: &str) -> Contact {
    Contact {
        name: name.to_owned(),
        phone: Some(phone.to_owned()),
        email: Some(email.to_owned()),
    }
}

/// Rosters with a player and one companion role ("keeper") on both tracks.
#[must_use]
pub fn sample_rosters() -> Rosters {
    Rosters {
        test: Roster {
            player: contact("Tessa Vale", "+4915200000001", "tessa@example.org"),
            companions: BTreeMap::from([(
                "keeper".to_owned(),
                contact("Konrad Weiss", "+4915200000002", "konrad@example.org"),
            )]),
        },
        live: Roster {
            player: contact("Liv Harrow", "+4915200000003", "liv@example.org"),
            companions: BTreeMap::from([(
                "keeper".to_owned(),
                contact("Mara Stein", "+4915200000004", "mara@example.org"),
            )]),
        },
    }
}

/// A three-chapter catalog exercising every step component:
///
/// - `gatehouse`: narrative, two consecutive messaging steps, riddle.
///   Completing the narrative cascades both messages and lands on the riddle.
/// - `vigil`: proximity puzzle followed by an admin-completed wait.
/// - `afterword`: companion of `gatehouse`; one delayed messaging step, so
///   completing `gatehouse` activates it and leaves a scheduled message.
#[must_use]
pub fn sample_catalog() -> Catalog {
    let gatehouse = Chapter {
        id: ChapterId::from("gatehouse"),
        name: "The Gatehouse".to_owned(),
        location: Some(GeoPoint {
            lat: 52.5163,
            lon: 13.3777,
        }),
        time_window: None,
        companion_of: None,
        steps: vec![
            Step {
                id: StepId::from("gatehouse-intro"),
                order: 1,
                config: StepConfig::Narrative {
                    body_md: "The city sleeps. **You** do not.".to_owned(),
                },
            },
            Step {
                id: StepId::from("gatehouse-ping"),
                order: 2,
                config: StepConfig::Message {
                    to: ContactRole::Player,
                    channel: Channel::Sms,
                    subject: None,
                    body: "The gate has opened. Walk east.".to_owned(),
                    progress_key: "gatehouse-ping".to_owned(),
                    delay_mornings: None,
                },
            },
            Step {
                id: StepId::from("gatehouse-letter"),
                order: 3,
                config: StepConfig::Message {
                    to: ContactRole::Companion("keeper".to_owned()),
                    channel: Channel::Email,
                    subject: Some("A word ahead".to_owned()),
                    body: "The player has passed the gate.".to_owned(),
                    progress_key: "gatehouse-letter".to_owned(),
                    delay_mornings: None,
                },
            },
            Step {
                id: StepId::from("gatehouse-riddle"),
                order: 4,
                config: StepConfig::Riddle {
                    prompt_md: "I hold a small flame but am not a hearth.".to_owned(),
                    answer: "Lantern".to_owned(),
                    hints: vec![
                        "It hangs by the door.".to_owned(),
                        "It is lit at dusk.".to_owned(),
                    ],
                },
            },
        ],
    };

    let vigil = Chapter {
        id: ChapterId::from("vigil"),
        name: "The Vigil".to_owned(),
        location: None,
        time_window: None,
        companion_of: None,
        steps: vec![
            Step {
                id: StepId::from("vigil-walk"),
                order: 1,
                config: StepConfig::Proximity {
                    target: GeoPoint {
                        lat: 52.5163,
                        lon: 13.3777,
                    },
                    gates: Vec::new(),
                    hints: vec!["Follow the river north.".to_owned()],
                },
            },
            Step {
                id: StepId::from("vigil-wait"),
                order: 2,
                config: StepConfig::AwaitSignal {
                    note: Some("Stay where you are. The keeper will find you.".to_owned()),
                },
            },
        ],
    };

    let afterword = Chapter {
        id: ChapterId::from("afterword"),
        name: "Afterword".to_owned(),
        location: None,
        time_window: None,
        companion_of: Some(ChapterId::from("gatehouse")),
        steps: vec![Step {
            id: StepId::from("afterword-note"),
            order: 1,
            config: StepConfig::Message {
                to: ContactRole::Player,
                channel: Channel::Sms,
                subject: None,
                body: "Two mornings on, remember the gate.".to_owned(),
                progress_key: "afterword-note".to_owned(),
                delay_mornings: Some(2),
            },
        }],
    };

    Catalog {
        chapters: vec![gatehouse, vigil, afterword],
        rosters: sample_rosters(),
    }
}
