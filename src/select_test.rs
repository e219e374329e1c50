use rand::{prelude::random, rngs::SmallRng, Rng};

use super::*;
use crate::{
    db::Db,
    field::{IntField, StrField},
    key::Key,
    table::Table,
};

#[derive(Clone, Debug, PartialEq)]
struct Person {
    id: i64,
    age: i64,
    city: String,
}

fn person(id: i64, age: i64, city: &str) -> Person {
    Person {
        id,
        age,
        city: city.to_string(),
    }
}

fn setup() -> (Db, Table<Person>, IntField<Person>, StrField<Person>) {
    let mut table = Table::new(|p: &Person| Key::from(p.id));
    let age = table.index_int(|p: &Person| p.age);
    let city = table.index_str(|p: &Person| p.city.clone());
    let db = Db::init(&[&table]).unwrap();
    (db, table, age, city)
}

fn load(db: &Db, table: &Table<Person>, people: Vec<Person>) {
    let mut txn = db.begin_write();
    table.set_many(&mut txn, people).unwrap();
    txn.commit();
}

fn s3_people() -> Vec<Person> {
    vec![
        person(1, 25, "NY"),
        person(2, 30, "NY"),
        person(3, 30, "LA"),
        person(4, 40, "NY"),
    ]
}

fn ids(people: &[Person]) -> Vec<i64> {
    people.iter().map(|p| p.id).collect()
}

#[test]
fn test_range_and_intersection() {
    let (db, table, age, city) = setup();
    load(&db, &table, s3_people());

    let txn = db.begin_read();
    let got = table
        .select(&txn)
        .filter(age.ge(30))
        .filter(city.is("NY"))
        .page(10, 0)
        .unwrap();
    assert_eq!(ids(&got), vec![2, 4]);

    let n = table
        .select(&txn)
        .filter(age.ge(30))
        .filter(city.is("NY"))
        .count()
        .unwrap();
    assert_eq!(n, 2);
}

#[test]
fn test_order_and_pagination() {
    let (db, table, age, _city) = setup();
    load(&db, &table, s3_people());

    let txn = db.begin_read();

    // ascending age, ties on 30 broken by primary-key byte order.
    let all = table.select(&txn).order_by(&age).asc().all().unwrap();
    assert_eq!(ids(&all), vec![1, 2, 3, 4]);

    let page = table.select(&txn).order_by(&age).asc().page(2, 1).unwrap();
    assert_eq!(ids(&page), ids(&all[1..3]));

    // descending age; ties still enumerate ascending by primary key.
    let desc = table.select(&txn).order_by(&age).desc().all().unwrap();
    assert_eq!(ids(&desc), vec![4, 2, 3, 1]);
}

#[test]
fn test_one() {
    let (db, table, _age, city) = setup();
    load(&db, &table, s3_people());

    let txn = db.begin_read();
    let p = table.select(&txn).filter(city.is("LA")).one().unwrap();
    assert_eq!(p.id, 3);

    let err = table.select(&txn).filter(city.is("SF")).one().unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_user_predicates() {
    let (db, table, age, city) = setup();
    load(&db, &table, s3_people());

    let txn = db.begin_read();

    // user predicates gate offset, limit and count alike.
    let even = Cond::when(|p: &Person| p.age % 2 == 0);
    let all = table.select(&txn).filter(even.clone()).all().unwrap();
    assert_eq!(ids(&all), vec![2, 3, 4]);
    assert_eq!(table.select(&txn).filter(even.clone()).count().unwrap(), 3);

    let page = table.select(&txn).filter(even.clone()).page(2, 1).unwrap();
    assert_eq!(ids(&page), vec![3, 4]);

    // combined with index narrowing.
    let got = table
        .select(&txn)
        .filter(city.is("NY"))
        .filter(Cond::when(|p: &Person| p.age < 35))
        .all()
        .unwrap();
    assert_eq!(ids(&got), vec![1, 2]);

    // and with ordering.
    let got = table
        .select(&txn)
        .filter(age.ge(25))
        .filter(Cond::when(|p: &Person| p.city == "NY"))
        .order_by(&age)
        .desc()
        .all()
        .unwrap();
    assert_eq!(ids(&got), vec![4, 2, 1]);
}

#[test]
fn test_empty_candidates() {
    let (db, table, age, city) = setup();
    load(&db, &table, s3_people());

    let txn = db.begin_read();
    assert_eq!(table.select(&txn).filter(age.gt(100)).count().unwrap(), 0);
    assert_eq!(
        table
            .select(&txn)
            .filter(age.ge(30))
            .filter(city.is("SF"))
            .all()
            .unwrap(),
        vec![]
    );
}

#[test]
fn test_unfiltered_walk() {
    let (db, table, _age, _city) = setup();
    load(&db, &table, s3_people());

    let txn = db.begin_read();
    // primary-key byte order, both directions.
    let all = table.select(&txn).all().unwrap();
    assert_eq!(ids(&all), vec![1, 2, 3, 4]);
    let desc = table.select(&txn).desc().all().unwrap();
    assert_eq!(ids(&desc), vec![4, 3, 2, 1]);
    assert_eq!(table.select(&txn).count().unwrap(), 4);
}

#[test]
fn test_rows_is_lazy() {
    let (db, table, age, _city) = setup();
    load(&db, &table, s3_people());

    let txn = db.begin_read();
    let mut rows = table.select(&txn).filter(age.ge(30)).rows().unwrap();
    assert_eq!(rows.next().map(|p| p.id), Some(2));
    assert_eq!(rows.next().map(|p| p.id), Some(3));
    assert_eq!(rows.next().map(|p| p.id), Some(4));
    assert_eq!(rows.next(), None);
    assert_eq!(rows.next(), None);
}

fn gen_people(rng: &mut SmallRng, n: usize) -> Vec<Person> {
    let cities = ["NY", "LA", "SF", "TX", "OR"];
    (0..n as i64)
        .map(|id| {
            let age = (rng.gen::<i64>() % 50).abs() - 10;
            let city = cities[rng.gen::<usize>() % cities.len()];
            person(id, age, city)
        })
        .collect()
}

#[test]
fn test_range_operators() {
    let seed: u128 = random();
    println!("test_range_operators seed:{}", seed);
    let mut rng = crate::util::small_rng_from_seed(seed);

    let (db, table, age, city) = setup();
    let people = gen_people(&mut rng, 200);
    load(&db, &table, people.clone());

    let txn = db.begin_read();
    for _ in 0..50 {
        let x = (rng.gen::<i64>() % 50).abs() - 10;

        let brute = |f: &dyn Fn(&Person) -> bool| -> Vec<i64> {
            people.iter().filter(|p| f(p)).map(|p| p.id).collect()
        };

        let got = table.select(&txn).filter(age.is(x)).all().unwrap();
        assert_eq!(ids(&got), brute(&|p| p.age == x), "is {}", x);

        let got = table.select(&txn).filter(age.lt(x)).all().unwrap();
        assert_eq!(ids(&got), brute(&|p| p.age < x), "lt {}", x);

        let got = table.select(&txn).filter(age.le(x)).all().unwrap();
        assert_eq!(ids(&got), brute(&|p| p.age <= x), "le {}", x);

        let got = table.select(&txn).filter(age.gt(x)).all().unwrap();
        assert_eq!(ids(&got), brute(&|p| p.age > x), "gt {}", x);

        let got = table.select(&txn).filter(age.ge(x)).all().unwrap();
        assert_eq!(ids(&got), brute(&|p| p.age >= x), "ge {}", x);
    }

    // string ranges, including probes between and beyond stored keys.
    for probe in ["", "LA", "M", "NY", "OZ", "zz"].iter() {
        let got = table.select(&txn).filter(city.lt(probe)).all().unwrap();
        let want: Vec<i64> =
            people.iter().filter(|p| p.city.as_str() < *probe).map(|p| p.id).collect();
        assert_eq!(ids(&got), want, "city lt {}", probe);

        let got = table.select(&txn).filter(city.ge(probe)).all().unwrap();
        let want: Vec<i64> =
            people.iter().filter(|p| p.city.as_str() >= *probe).map(|p| p.id).collect();
        assert_eq!(ids(&got), want, "city ge {}", probe);
    }
}

#[test]
fn test_pagination_laws() {
    let seed: u128 = random();
    println!("test_pagination_laws seed:{}", seed);
    let mut rng = crate::util::small_rng_from_seed(seed);

    let (db, table, age, city) = setup();
    let people = gen_people(&mut rng, 120);
    load(&db, &table, people);

    let txn = db.begin_read();
    let query = |qi: usize| {
        match qi {
            0 => table.select(&txn),
            1 => table.select(&txn).desc(),
            2 => table.select(&txn).filter(age.ge(10)),
            3 => table.select(&txn).filter(age.ge(0)).filter(city.is("NY")),
            4 => table.select(&txn).order_by(&age),
            5 => table.select(&txn).order_by(&age).desc(),
            6 => table.select(&txn).filter(city.is("LA")).order_by(&age),
            _ => table
                .select(&txn)
                .filter(age.lt(20))
                .filter(Cond::when(|p: &Person| p.id % 3 != 0))
                .order_by(&age)
                .desc(),
        }
    };

    for qi in 0..8 {
        let all = query(qi).all().unwrap();
        assert_eq!(query(qi).count().unwrap(), all.len(), "query {}", qi);

        for &(limit, offset) in
            [(1, 0), (3, 2), (7, 0), (5, 100), (0, 4), (2, all.len())].iter()
        {
            let want: Vec<Person> = if limit == 0 {
                all.iter().skip(offset).cloned().collect()
            } else {
                all.iter().skip(offset).take(limit).cloned().collect()
            };
            let got = query(qi).page(limit, offset).unwrap();
            assert_eq!(got, want, "query {} page({}, {})", qi, limit, offset);
        }
    }
}

#[test]
fn test_ordered_matches_model() {
    let seed: u128 = random();
    println!("test_ordered_matches_model seed:{}", seed);
    let mut rng = crate::util::small_rng_from_seed(seed);

    let (db, table, age, city) = setup();
    let people = gen_people(&mut rng, 150);
    load(&db, &table, people.clone());

    let txn = db.begin_read();

    let mut want = people.clone();
    want.sort_by(|a, b| a.age.cmp(&b.age).then(a.id.cmp(&b.id)));
    let got = table.select(&txn).order_by(&age).all().unwrap();
    assert_eq!(got, want);

    // descending by age; within an age bucket primary keys ascend.
    let mut want = people.clone();
    want.sort_by(|a, b| b.age.cmp(&a.age).then(a.id.cmp(&b.id)));
    let got = table.select(&txn).order_by(&age).desc().all().unwrap();
    assert_eq!(got, want);

    // ordered and filtered together.
    let mut want: Vec<Person> =
        people.iter().filter(|p| p.city == "NY" && p.age >= 5).cloned().collect();
    want.sort_by(|a, b| a.age.cmp(&b.age).then(a.id.cmp(&b.id)));
    let got = table
        .select(&txn)
        .filter(city.is("NY"))
        .filter(age.ge(5))
        .order_by(&age)
        .all()
        .unwrap();
    assert_eq!(got, want);
}

#[test]
fn test_select_after_updates() {
    let seed: u128 = random();
    println!("test_select_after_updates seed:{}", seed);
    let mut rng = crate::util::small_rng_from_seed(seed);

    let (db, table, age, city) = setup();
    let cities = ["NY", "LA", "SF"];
    let mut model: Vec<Option<Person>> = vec![None; 60];

    // churn records across many transactions, then check every index
    // query against the model.
    for _round in 0..10 {
        let mut txn = db.begin_write();
        for _ in 0..40 {
            let id = (rng.gen::<u64>() % 60) as i64;
            if rng.gen::<u8>() % 4 == 0 {
                table.delete(&mut txn, &Key::from(id)).unwrap();
                model[id as usize] = None;
            } else {
                let p = person(
                    id,
                    (rng.gen::<i64>() % 30).abs(),
                    cities[rng.gen::<usize>() % cities.len()],
                );
                table.set(&mut txn, p.clone()).unwrap();
                model[id as usize] = Some(p);
            }
        }
        txn.commit();

        let live: Vec<Person> = model.iter().flatten().cloned().collect();
        let txn = db.begin_read();
        assert_eq!(table.select(&txn).all().unwrap(), live);
        for c in cities.iter() {
            let want: Vec<i64> =
                live.iter().filter(|p| p.city == *c).map(|p| p.id).collect();
            let got = table.select(&txn).filter(city.is(c)).all().unwrap();
            assert_eq!(ids(&got), want, "city {}", c);
        }
        for x in [0_i64, 5, 15, 29].iter() {
            let want: Vec<i64> =
                live.iter().filter(|p| p.age >= *x).map(|p| p.id).collect();
            let got = table.select(&txn).filter(age.ge(*x)).all().unwrap();
            assert_eq!(ids(&got), want, "age ge {}", x);
        }
    }
}
