use paddock::{
    catalog::TemplateId,
    grid::Cell,
    mode::{InputEvent, Mode, Notification},
    placement::PlacementError,
    removal::{EnclosurePolicy, RemovalError},
    scenario::Scenario,
    world::EntityId,
    Game,
};

fn empty_farm(policy: EnclosurePolicy) -> Game {
    let scenario = Scenario {
        layout: Vec::new(),
        enclosure_policy: policy,
        ..Scenario::default_farm()
    };
    Game::from_scenario(&scenario, None).unwrap()
}

fn gameplay(notifications: Vec<Notification>) -> Vec<Notification> {
    notifications
        .into_iter()
        .filter(|n| !matches!(n, Notification::ModeChanged(_)))
        .collect()
}

fn select(game: &mut Game, id: &str) {
    game.handle_input(InputEvent::TemplateSelected(TemplateId::new(id)));
}

fn click(game: &mut Game, col: i32, row: i32) -> Vec<Notification> {
    game.handle_input(InputEvent::ClickAt(Cell::new(col, row)));
    gameplay(game.drain_notifications())
}

fn placed(notifications: &[Notification]) -> EntityId {
    match notifications {
        [Notification::PlacementSucceeded(id)] => *id,
        other => panic!("expected a placement, got {other:?}"),
    }
}

#[test]
fn build_stock_and_bulldoze_a_pen() {
    let mut game = empty_farm(EnclosurePolicy::Forbid);

    select(&mut game, "small_pen");
    assert_eq!(game.current_mode(), Mode::Construction);
    let pen = placed(&click(&mut game, 10, 10));
    assert_eq!(game.balance(), 1_700);

    game.handle_input(InputEvent::ModeToggle(Mode::AnimalPlacement));
    select(&mut game, "sheep");
    assert_eq!(game.current_mode(), Mode::AnimalPlacement);
    let sheep = placed(&click(&mut game, 12, 12));
    assert_eq!(game.balance(), 1_550);

    game.handle_input(InputEvent::ModeToggle(Mode::Destruction));
    assert_eq!(game.armed_template(), None);
    assert_eq!(
        click(&mut game, 10, 10),
        vec![Notification::RemovalRejected(
            RemovalError::EnclosureNotEmpty {
                enclosure: pen,
                animals: 1
            }
        )]
    );

    assert_eq!(
        click(&mut game, 12, 12),
        vec![Notification::EntityRemoved {
            id: sheep,
            refund: 75
        }]
    );
    assert_eq!(
        click(&mut game, 10, 10),
        vec![Notification::EntityRemoved {
            id: pen,
            refund: 150
        }]
    );
    assert_eq!(game.balance(), 1_550 + 75 + 150);
    assert_eq!(game.world().entity_count(), 0);
}

#[test]
fn bulldozing_nothing_changes_nothing() {
    let mut game = empty_farm(EnclosurePolicy::Forbid);
    game.handle_input(InputEvent::ModeToggle(Mode::Destruction));
    game.drain_notifications();
    let before = game.snapshot();

    assert_eq!(
        click(&mut game, 20, 20),
        vec![Notification::NothingToRemove(Cell::new(20, 20))]
    );
    assert_eq!(game.snapshot(), before);
    assert_eq!(game.current_mode(), Mode::Destruction);
}

#[test]
fn rejected_click_keeps_mode_and_template() {
    let mut game = empty_farm(EnclosurePolicy::Forbid);
    select(&mut game, "statue");
    assert_eq!(
        click(&mut game, 3, 3),
        vec![Notification::PlacementRejected(
            PlacementError::InsufficientFunds {
                required: 2_500,
                available: 2_000
            }
        )]
    );
    assert_eq!(game.current_mode(), Mode::Construction);
    assert_eq!(game.armed_template(), Some(&TemplateId::new("statue")));

    select(&mut game, "sheep");
    assert_eq!(
        gameplay(game.drain_notifications()),
        vec![Notification::PlacementRejected(PlacementError::WrongMode(
            TemplateId::new("sheep")
        ))]
    );
    assert_eq!(game.armed_template(), Some(&TemplateId::new("statue")));

    game.handle_input(InputEvent::ModeToggle(Mode::AnimalPlacement));
    select(&mut game, "sheep");
    assert_eq!(
        click(&mut game, 3, 3),
        vec![Notification::PlacementRejected(PlacementError::NoEnclosure(
            Cell::new(3, 3)
        ))]
    );
    assert_eq!(game.current_mode(), Mode::AnimalPlacement);
}

#[test]
fn cascade_removes_members_with_the_pen() {
    let mut game = empty_farm(EnclosurePolicy::Cascade);
    select(&mut game, "small_pen");
    let pen = placed(&click(&mut game, 0, 0));
    game.handle_input(InputEvent::ModeToggle(Mode::AnimalPlacement));
    select(&mut game, "rooster");
    let a = placed(&click(&mut game, 1, 1));
    let b = placed(&click(&mut game, 3, 3));

    game.handle_input(InputEvent::ModeToggle(Mode::Destruction));
    let removed = click(&mut game, 0, 0);
    assert_eq!(
        removed,
        vec![
            Notification::EntityRemoved { id: a, refund: 40 },
            Notification::EntityRemoved { id: b, refund: 40 },
            Notification::EntityRemoved {
                id: pen,
                refund: 150
            },
        ]
    );
    assert_eq!(game.world().animals().count(), 0);
}

#[test]
fn relocate_moves_members_to_another_pen() {
    let mut game = empty_farm(EnclosurePolicy::Relocate);
    select(&mut game, "small_pen");
    let old_pen = placed(&click(&mut game, 0, 0));
    let new_pen = placed(&click(&mut game, 10, 0));
    game.handle_input(InputEvent::ModeToggle(Mode::AnimalPlacement));
    select(&mut game, "sheep");
    let sheep = placed(&click(&mut game, 2, 2));

    game.handle_input(InputEvent::ModeToggle(Mode::Destruction));
    let notifications = click(&mut game, 0, 0);
    assert_eq!(
        notifications,
        vec![
            Notification::EntityRemoved {
                id: old_pen,
                refund: 150
            },
            Notification::AnimalRelocated {
                animal: sheep,
                enclosure: new_pen
            },
        ]
    );
    let animal = game.world().animal(sheep).unwrap();
    assert_eq!(animal.enclosure, new_pen);
    assert!(game
        .world()
        .enclosure(new_pen)
        .unwrap()
        .interior
        .contains(animal.position));
}

#[test]
fn info_overlay_inspects_without_building() {
    let mut game = empty_farm(EnclosurePolicy::Forbid);
    select(&mut game, "well");
    game.handle_input(InputEvent::ModeToggle(Mode::Info));
    assert_eq!(game.current_mode(), Mode::Info);

    let notifications = click(&mut game, 4, 4);
    assert!(matches!(
        notifications.as_slice(),
        [Notification::CellInspected {
            state: Some(_),
            animal: None,
            ..
        }]
    ));
    assert_eq!(game.world().entity_count(), 0);

    game.handle_input(InputEvent::ModeToggle(Mode::Info));
    assert_eq!(game.current_mode(), Mode::Construction);
    assert_eq!(game.armed_template(), Some(&TemplateId::new("well")));
    let well = placed(&click(&mut game, 4, 4));
    assert_eq!(game.world().entity(well).unwrap().template, TemplateId::new("well"));
}
