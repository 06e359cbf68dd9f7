//! Query filter integration tests

use tablekv_core::{Number, Owner, Query, Record, Store};

#[derive(Debug, Default, Clone, PartialEq, Record)]
#[tkv(table_name = "balloons")]
struct Balloon {
    id: u32,
    color: String,
    size: i32,
}

fn seeded(pairs: &[(&str, i32)]) -> Store {
    let store = Store::open_in_memory().unwrap();
    for (color, size) in pairs {
        let mut b = Balloon {
            id: 0,
            color: color.to_string(),
            size: *size,
        };
        store.save(&Owner::Root, &mut b).unwrap();
    }
    store
}

fn colors(rows: &[Balloon]) -> Vec<&str> {
    rows.iter().map(|b| b.color.as_str()).collect()
}

#[test]
fn single_predicate() {
    let store = seeded(&[("WHITE", 366), ("RED", 695)]);

    let white: Vec<Balloon> = Query::new()
        .filter("color")
        .eq(["WHITE"])
        .run(&store, &Owner::Root)
        .unwrap();
    assert_eq!(white, vec![Balloon { id: 0, color: "WHITE".into(), size: 366 }]);

    let red: Vec<Balloon> = Query::new()
        .filter("color")
        .eq(["RED"])
        .run(&store, &Owner::Root)
        .unwrap();
    assert_eq!(red, vec![Balloon { id: 1, color: "RED".into(), size: 695 }]);
}

#[test]
fn single_predicate_many_values() {
    let store = seeded(&[("WHITE", 366), ("RED", 695)]);
    let rows: Vec<Balloon> = Query::new()
        .filter("color")
        .eq(["GREEN", "WHITE", "CYAN", "PURPLE", "RED", "GOLD"])
        .run(&store, &Owner::Root)
        .unwrap();
    assert_eq!(colors(&rows), vec!["WHITE", "RED"]);
}

#[test]
fn no_match_is_empty_not_error() {
    let store = seeded(&[("WHITE", 366), ("RED", 695)]);
    for literal in ["deef", "rgrr"] {
        let rows: Vec<Balloon> = Query::new()
            .filter("color")
            .eq([literal])
            .run(&store, &Owner::Root)
            .unwrap();
        assert!(rows.is_empty());
    }
}

#[test]
fn predicates_are_conjunctive() {
    let store = seeded(&[("RED", 695), ("WHITE", 366)]);

    let rows: Vec<Balloon> = Query::new()
        .filter("color")
        .eq(["WHITE"])
        .filter("size")
        .eq([366])
        .run(&store, &Owner::Root)
        .unwrap();
    assert_eq!(rows, vec![Balloon { id: 1, color: "WHITE".into(), size: 366 }]);

    let rows: Vec<Balloon> = Query::new()
        .filter("color")
        .eq(["ZIMA_BLUE", "BLACK", "WHITE", "RED"])
        .filter("size")
        .eq([222, 366, 948])
        .run(&store, &Owner::Root)
        .unwrap();
    assert_eq!(colors(&rows), vec!["WHITE"]);
}

#[test]
fn conflicting_predicates_match_nothing() {
    let store = seeded(&[("RED", 695), ("WHITE", 366)]);
    let rows: Vec<Balloon> = Query::new()
        .filter("color")
        .eq(["WHITE"])
        .filter("size")
        .eq([695])
        .run(&store, &Owner::Root)
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn numeric_literals_of_other_widths_match() {
    let store = seeded(&[("RED", 695), ("WHITE", 366)]);
    let by_i64: Vec<Balloon> = Query::new()
        .filter("size")
        .eq([695i64])
        .run(&store, &Owner::Root)
        .unwrap();
    assert_eq!(colors(&by_i64), vec!["RED"]);

    let by_literal: Vec<Balloon> = Query::new()
        .filter("size")
        .eq([Number::parse("366").unwrap()])
        .run(&store, &Owner::Root)
        .unwrap();
    assert_eq!(colors(&by_literal), vec!["WHITE"]);
}

#[test]
fn empty_query_loads_everything() {
    let store = seeded(&[("RED", 695), ("WHITE", 366), ("BLUE", 1)]);
    let rows: Vec<Balloon> = Query::new().run(&store, &Owner::Root).unwrap();
    assert_eq!(colors(&rows), vec!["RED", "WHITE", "BLUE"]);
}

#[test]
fn less_than_filter_does_not_restrict() {
    let store = seeded(&[("RED", 695), ("WHITE", 366)]);
    let rows: Vec<Balloon> = Query::new()
        .filter("size")
        .lt([0])
        .run(&store, &Owner::Root)
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn template_query_is_reusable() {
    let store = seeded(&[("RED", 695), ("WHITE", 366), ("WHITE", 12)]);
    let white = Query::new().filter("color").eq(["WHITE"]);
    let small_white = white.filter("size").eq([12]);

    let all_white: Vec<Balloon> = white.run(&store, &Owner::Root).unwrap();
    let just_small: Vec<Balloon> = small_white.run(&store, &Owner::Root).unwrap();
    assert_eq!(all_white.len(), 2);
    assert_eq!(just_small, vec![Balloon { id: 2, color: "WHITE".into(), size: 12 }]);
}

#[test]
fn filters_respect_owner() {
    let store = seeded(&[("WHITE", 366)]);
    let other = Owner::id("f00d").unwrap();
    let mut b = Balloon {
        id: 0,
        color: "WHITE".into(),
        size: 1,
    };
    store.save(&other, &mut b).unwrap();

    let rows: Vec<Balloon> = Query::new()
        .filter("color")
        .eq(["WHITE"])
        .run(&store, &other)
        .unwrap();
    assert_eq!(rows, vec![Balloon { id: 0, color: "WHITE".into(), size: 1 }]);
}
