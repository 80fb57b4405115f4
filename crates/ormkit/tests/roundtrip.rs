//! SQL rendering and in-memory evaluation must select the same rows.

mod common;

use common::{registry, setup};
use ormkit::prelude::*;
use ormkit::compile;
use proptest::prelude::*;

const MORE_USERS: &str = r#"
INSERT INTO "User" VALUES ('DDDDDDDDDD', 'Carol', 'carol@example.com', 'User', 0, 900, '2020-07-21', 'AAAAAAAAAA', '2022-09-01 08:30:00');
INSERT INTO "User" VALUES ('EEEEEEEEEE', 'Dan', 'dan@example.com', 'Admin', 1, 5000, '2018-01-15', 'CCCCCCCCCC', '2020-01-01 00:00:00');
INSERT INTO "User" VALUES ('FFFFFFFFFF', 'Bob', 'bob2@example.com', 'User', 1, 350, '2022-02-28', NULL, NULL);
"#;

const NAMES: &[&str] = &["John", "Alice", "Bob", "Carol", "Dan", "Erin"];
const CREDITS: &[i64] = &[0, 350, 900, 1200, 2500, 5000];
const DATES: &[&str] = &["2018-01-15", "2019-03-02", "2020-07-21", "2021-01-01", "2022-02-28"];
const TIMESTAMPS: &[&str] = &[
    "2020-01-01 00:00:00",
    "2021-12-31 23:59:59",
    "2022-01-01 00:00:00",
    "2022-09-01 08:30:00",
    "2022-09-01 08:30:01",
];

fn relation(field: &str, op: u8, value: Value) -> Predicate {
    let column = col(field);
    match op % 6 {
        0 => column.eq(value),
        1 => column.ne(value),
        2 => column.lt(value),
        3 => column.le(value),
        4 => column.gt(value),
        _ => column.ge(value),
    }
}

fn leaf() -> impl Strategy<Value = Predicate> {
    prop_oneof![
        (prop::sample::select(NAMES), any::<bool>()).prop_map(|(name, eq)| {
            if eq { col("Name").eq(name) } else { col("Name").ne(name) }
        }),
        prop::sample::select(&["User", "Admin"][..]).prop_map(|rank| col("Rank").eq(rank)),
        (prop::sample::select(CREDITS), any::<u8>())
            .prop_map(|(credit, op)| relation("Credit", op, Value::BigInt(credit))),
        any::<bool>().prop_map(|verified| col("Verified").eq(verified)),
        (prop::sample::select(DATES), any::<u8>())
            .prop_map(|(date, op)| relation("Joined", op, Value::from(date))),
        any::<bool>().prop_map(|null| {
            if null { col("ReferrerID").is_null() } else { col("ReferrerID").is_not_null() }
        }),
        (prop::sample::select(TIMESTAMPS), any::<u8>())
            .prop_map(|(at, op)| relation("LastSeen", op, Value::from(at))),
    ]
}

fn predicate() -> impl Strategy<Value = Predicate> {
    leaf().prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.and(b)),
            (inner.clone(), inner).prop_map(|(a, b)| a.or(b)),
        ]
    })
}

fn ids(models: &[ModelRef]) -> Vec<String> {
    let mut ids: Vec<String> = models.iter().map(|m| common::text(m, "ID")).collect();
    ids.sort();
    ids
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sql_and_evaluate_agree(predicate in predicate()) {
        let (_dir, backend) = setup();
        backend.execute(MORE_USERS);
        let reg = registry();
        let config = SessionConfig { use_cache: false, ..SessionConfig::default() };
        let mut session = Session::with_config(&reg, backend, config);

        let from_sql = session.get_many("User", &predicate).unwrap();

        let info = reg.model("User").unwrap();
        let condition = compile(info, reg.validators(), &predicate).unwrap();
        let everyone = session.fetch("User").unwrap().all().unwrap();
        prop_assert_eq!(everyone.len(), 6);
        let in_memory: Vec<ModelRef> = everyone
            .into_iter()
            .filter(|m| condition.evaluate(&m.borrow()))
            .collect();

        prop_assert_eq!(ids(&from_sql), ids(&in_memory));
    }
}

#[test]
fn known_predicates_agree() {
    let (_dir, backend) = setup();
    backend.execute(MORE_USERS);
    let reg = registry();
    let mut session = Session::new(&reg, backend);

    let cases = [
        (
            col("Credit").ge(900).and(col("Rank").eq("User")),
            vec!["AAAAAAAAAA", "DDDDDDDDDD"],
        ),
        (
            col("Name").eq("Bob").or(col("Joined").lt("2019-01-01")),
            vec!["CCCCCCCCCC", "EEEEEEEEEE", "FFFFFFFFFF"],
        ),
        (
            col("ReferrerID").is_not_null().and(col("Verified").eq(false)),
            vec!["CCCCCCCCCC", "DDDDDDDDDD"],
        ),
        (
            col("LastSeen").ge("2021-12-31 23:59:59"),
            vec!["AAAAAAAAAA", "BBBBBBBBBB", "DDDDDDDDDD"],
        ),
        (
            col("LastSeen").eq("2022-09-01 08:30:00").or(col("LastSeen").lt("2021-01-01")),
            vec!["AAAAAAAAAA", "DDDDDDDDDD", "EEEEEEEEEE"],
        ),
    ];
    let info = reg.model("User").unwrap();
    for (predicate, expected) in cases {
        let found = session.get_many("User", &predicate).unwrap();
        assert_eq!(ids(&found), expected);

        let condition = compile(info, reg.validators(), &predicate).unwrap();
        let everyone = session.fetch("User").unwrap().all().unwrap();
        let matched: Vec<ModelRef> = everyone
            .into_iter()
            .filter(|m| condition.evaluate(&m.borrow()))
            .collect();
        assert_eq!(ids(&matched), expected);
    }
}
