mod support;

use quern_core::{
    AffectedTables, Engine, MapperResult, OperationError, PutResolver, PutResult, Row, Storage,
    UpdateQuery,
};
use std::cell::Cell;
use support::{
    count_users, tables, user_row, CountingPutResolver, NoTransactionEngine, User,
};

#[test]
fn put_one_maps_resolves_and_notifies_exactly_once() {
    let storage = support::users_storage();
    let watch = storage.watch(["users"]);
    let resolver = CountingPutResolver::new("users");
    let map_calls = Cell::new(0usize);

    let mut user = User::new("test@example.com");
    let result = storage
        .put()
        .object(&mut user)
        .with_mapper(|user: &User| -> MapperResult<Row> {
            map_calls.set(map_calls.get() + 1);
            user_row(user)
        })
        .with_resolver(&resolver)
        .prepare()
        .unwrap()
        .execute()
        .unwrap();

    assert!(result.was_inserted());
    assert_eq!(result.inserted_id(), Some(1));
    assert_eq!(result.affected_tables(), &tables(&["users"]));

    assert_eq!(map_calls.get(), 1);
    assert_eq!(resolver.performs.get(), 1);
    assert_eq!(resolver.afters.get(), 1);
    assert_eq!(user.id, Some(1));

    assert_eq!(watch.try_recv(), Some(tables(&["users"])));
    assert!(watch.try_recv().is_none());
}

#[test]
fn put_one_update_variant_reports_rows_updated() {
    struct TouchEmailResolver;

    impl PutResolver<User> for TouchEmailResolver {
        fn perform_put(
            &self,
            engine: &dyn Engine,
            row: Row,
        ) -> quern_core::OperationResult<PutResult> {
            let rows_updated = engine.update(&UpdateQuery::table("users"), &row)?;
            Ok(PutResult::updated(rows_updated, ["users"]))
        }
    }

    let storage = support::users_storage();
    let insert_resolver = CountingPutResolver::new("users");
    let mut existing = User::new("old@example.com");
    storage
        .put()
        .object(&mut existing)
        .with_mapper(user_row)
        .with_resolver(&insert_resolver)
        .prepare()
        .unwrap()
        .execute()
        .unwrap();

    let watch = storage.watch(["users"]);
    let mut replacement = User::new("new@example.com");
    let result = storage
        .put()
        .object(&mut replacement)
        .with_mapper(user_row)
        .with_resolver(&TouchEmailResolver)
        .prepare()
        .unwrap()
        .execute()
        .unwrap();

    assert!(!result.was_inserted());
    assert_eq!(result.rows_updated(), Some(1));
    assert_eq!(watch.try_recv(), Some(tables(&["users"])));
}

#[test]
fn put_one_deferred_is_cold_until_run() {
    let storage = support::users_storage();
    let watch = storage.watch(["users"]);
    let resolver = CountingPutResolver::new("users");

    let mut user = User::new("cold@example.com");
    let deferred = storage
        .put()
        .object(&mut user)
        .with_mapper(user_row)
        .with_resolver(&resolver)
        .prepare()
        .unwrap()
        .defer();

    assert_eq!(resolver.performs.get(), 0);
    assert!(watch.try_recv().is_none());

    let result = deferred.run().unwrap();
    assert_eq!(result.inserted_id(), Some(1));
    assert_eq!(resolver.performs.get(), 1);
    assert_eq!(watch.try_recv(), Some(tables(&["users"])));
}

#[test]
fn put_one_cancelled_deferred_does_no_work() {
    let storage = support::users_storage();
    let watch = storage.watch(["users"]);
    let resolver = CountingPutResolver::new("users");

    let mut user = User::new("never@example.com");
    let deferred = storage
        .put()
        .object(&mut user)
        .with_mapper(user_row)
        .with_resolver(&resolver)
        .prepare()
        .unwrap()
        .defer();
    drop(deferred);

    assert_eq!(resolver.performs.get(), 0);
    assert_eq!(resolver.afters.get(), 0);
    assert!(watch.try_recv().is_none());
    assert_eq!(count_users(&storage), 0);
}

#[test]
fn put_prepared_without_resolver_is_a_configuration_error() {
    let storage = support::users_storage();
    let mut user = User::new("incomplete@example.com");

    let result = storage
        .put()
        .object(&mut user)
        .with_mapper(user_row)
        .prepare();

    assert!(matches!(result, Err(OperationError::Configuration(_))));
}

#[test]
fn put_prepared_without_mapper_is_a_configuration_error() {
    let storage = support::users_storage();
    let resolver = CountingPutResolver::new("users");
    let mut user = User::new("incomplete@example.com");

    let result = storage
        .put()
        .object(&mut user)
        .with_resolver(&resolver)
        .prepare();

    assert!(matches!(result, Err(OperationError::Configuration(_))));
}

#[test]
fn put_many_transactional_notifies_once_with_union() {
    let storage = support::users_storage();
    let watch = storage.watch(["users"]);
    let resolver = CountingPutResolver::new("users");
    let map_calls = Cell::new(0usize);

    let mut users = [
        User::new("1@example.com"),
        User::new("2@example.com"),
        User::new("3@example.com"),
    ];
    let result = storage
        .put()
        .objects(&mut users)
        .with_mapper(|user: &User| -> MapperResult<Row> {
            map_calls.set(map_calls.get() + 1);
            user_row(user)
        })
        .with_resolver(&resolver)
        .use_transaction_if_supported()
        .prepare()
        .unwrap()
        .execute()
        .unwrap();

    assert_eq!(result.len(), 3);
    assert!(result.all_succeeded());
    assert_eq!(result.affected_tables(), tables(&["users"]));

    assert_eq!(map_calls.get(), 3);
    assert_eq!(resolver.performs.get(), 3);
    assert_eq!(resolver.afters.get(), 3);
    for (index, user) in users.iter().enumerate() {
        assert_eq!(user.id, Some(index as i64 + 1));
    }

    assert_eq!(watch.try_recv(), Some(tables(&["users"])));
    assert!(watch.try_recv().is_none());
    assert_eq!(count_users(&storage), 3);
}

#[test]
fn put_many_without_transaction_notifies_per_item_in_order() {
    let storage = support::users_storage();
    let watch = storage.watch(["users"]);
    let resolver = CountingPutResolver::new("users");

    let mut users = [
        User::new("1@example.com"),
        User::new("2@example.com"),
        User::new("3@example.com"),
    ];
    let result = storage
        .put()
        .objects(&mut users)
        .with_mapper(user_row)
        .with_resolver(&resolver)
        .without_transaction()
        .prepare()
        .unwrap()
        .execute()
        .unwrap();

    assert_eq!(result.num_succeeded(), 3);
    for _ in 0..3 {
        assert_eq!(watch.try_recv(), Some(tables(&["users"])));
    }
    assert!(watch.try_recv().is_none());
}

#[test]
fn put_many_falls_back_to_per_item_when_transactions_unsupported() {
    let storage = Storage::new(NoTransactionEngine::new(support::users_engine()));
    let watch = storage.watch(["users"]);
    let resolver = CountingPutResolver::new("users");

    let mut users = [User::new("1@example.com"), User::new("2@example.com")];
    let result = storage
        .put()
        .objects(&mut users)
        .with_mapper(user_row)
        .with_resolver(&resolver)
        .use_transaction_if_supported()
        .prepare()
        .unwrap()
        .execute()
        .unwrap();

    assert!(result.all_succeeded());
    assert_eq!(watch.try_recv(), Some(tables(&["users"])));
    assert_eq!(watch.try_recv(), Some(tables(&["users"])));
    assert!(watch.try_recv().is_none());
}

#[test]
fn put_many_transactional_failure_rolls_back_everything() {
    let storage = support::users_storage();
    let watch = storage.watch(["users"]);
    let resolver = CountingPutResolver::failing_at("users", 1);

    let mut users = [
        User::new("1@example.com"),
        User::new("2@example.com"),
        User::new("3@example.com"),
    ];
    let err = storage
        .put()
        .objects(&mut users)
        .with_mapper(user_row)
        .with_resolver(&resolver)
        .prepare()
        .unwrap()
        .execute()
        .unwrap_err();

    assert!(matches!(err, OperationError::Resolver(_)));
    // First item was written inside the transaction, then rolled back.
    assert_eq!(count_users(&storage), 0);
    assert!(watch.try_recv().is_none());
    // Processing stopped at the failing item.
    assert_eq!(resolver.performs.get(), 2);
}

#[test]
fn put_many_without_transaction_scopes_failure_to_one_item() {
    let storage = support::users_storage();
    let watch = storage.watch(["users"]);
    let resolver = CountingPutResolver::failing_at("users", 1);

    let mut users = [
        User::new("1@example.com"),
        User::new("2@example.com"),
        User::new("3@example.com"),
    ];
    let result = storage
        .put()
        .objects(&mut users)
        .with_mapper(user_row)
        .with_resolver(&resolver)
        .without_transaction()
        .prepare()
        .unwrap()
        .execute()
        .unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result.num_succeeded(), 2);
    assert!(matches!(result.entry(0), Some(Ok(_))));
    assert!(matches!(
        result.entry(1),
        Some(Err(OperationError::Resolver(_)))
    ));
    assert!(matches!(result.entry(2), Some(Ok(_))));

    // Items before and after the failure stay committed and notified.
    assert_eq!(count_users(&storage), 2);
    assert_eq!(users[0].id, Some(1));
    assert_eq!(users[1].id, None);
    assert_eq!(users[2].id, Some(2));

    assert_eq!(watch.try_recv(), Some(tables(&["users"])));
    assert_eq!(watch.try_recv(), Some(tables(&["users"])));
    assert!(watch.try_recv().is_none());
}

#[test]
fn put_many_deferred_runs_whole_batch_on_demand() {
    let storage = support::users_storage();
    let resolver = CountingPutResolver::new("users");

    let mut users = [User::new("1@example.com"), User::new("2@example.com")];
    let deferred = storage
        .put()
        .objects(&mut users)
        .with_mapper(user_row)
        .with_resolver(&resolver)
        .prepare()
        .unwrap()
        .defer();

    assert_eq!(resolver.performs.get(), 0);

    let result = deferred.run().unwrap();
    assert!(result.all_succeeded());
    assert_eq!(count_users(&storage), 2);
}

#[test]
fn put_rejects_successful_write_with_no_affected_tables() {
    struct NoTablesResolver {
        afters: Cell<usize>,
    }

    impl PutResolver<User> for NoTablesResolver {
        fn perform_put(
            &self,
            _engine: &dyn Engine,
            _row: Row,
        ) -> quern_core::OperationResult<PutResult> {
            Ok(PutResult::inserted(9, std::iter::empty::<String>()))
        }

        fn after_put(
            &self,
            _object: &mut User,
            _result: &PutResult,
        ) -> quern_core::OperationResult<()> {
            self.afters.set(self.afters.get() + 1);
            Ok(())
        }
    }

    let storage = support::users_storage();
    let watch = storage.watch(["users"]);
    let resolver = NoTablesResolver {
        afters: Cell::new(0),
    };

    let mut user = User::new("ghost@example.com");
    let err = storage
        .put()
        .object(&mut user)
        .with_mapper(user_row)
        .with_resolver(&resolver)
        .prepare()
        .unwrap()
        .execute()
        .unwrap_err();

    assert!(matches!(err, OperationError::Resolver(_)));
    // The guard fires before the after-hook and before any notification.
    assert_eq!(resolver.afters.get(), 0);
    assert!(watch.try_recv().is_none());
}
