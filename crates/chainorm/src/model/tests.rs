use super::*;
use crate::dialect::Dialect;
use crate::events::EventKind;
use crate::testing::{MockService, mock_orm};
use crate::{params, row};
use std::sync::Mutex;

fn setup() -> (MockService, Arc<Orm>) {
    let mock = MockService::new();
    let orm = mock_orm(&mock).unwrap();
    (mock, orm)
}

#[test]
fn non_starter_call_begins_find() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();
    assert_eq!(m.op_mode(), OpMode::AfterReset);

    m.where_("items.proto_id = ?", params![7]).unwrap();
    assert_eq!(m.op_mode(), OpMode::Find);
    assert_eq!(
        m.to_sql_string().unwrap(),
        "SELECT items.* FROM items WHERE items.proto_id = 7"
    );
    let ops = m.action_data().iter().map(|a| a.op).collect::<Vec<_>>();
    assert_eq!(ops, ["find", "where"]);
}

#[test]
fn find_qualifies_bare_fields() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();
    m.find(&["id", "name", "protos.name AS proto", "COUNT(*) AS n"])
        .unwrap();
    assert_eq!(
        m.to_sql_string().unwrap(),
        "SELECT items.id,items.name,protos.name AS proto,COUNT(*) AS n FROM items"
    );
}

#[test]
fn modifiers_respect_mode() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();

    m.find(&[]).unwrap();
    assert!(m.set_fields(row! { "a" => 1 }).unwrap_err().is_invalid_mode());

    m.update(row! { "a" => 1 }).unwrap();
    assert!(m.offset(5).unwrap_err().is_invalid_mode());
    assert!(m.page(1, None).unwrap_err().is_invalid_mode());

    m.insert(row! { "a" => 1 }).unwrap();
    assert!(m.where_("x = 1", params![]).unwrap_err().is_invalid_mode());
}

#[tokio::test]
async fn executing_without_statement_fails() {
    let (mock, orm) = setup();
    let mut m = orm.model("items").unwrap();
    let err = m.end(DoOptions::default()).await.unwrap_err();
    assert!(err.is_invalid_mode());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn all_wraps_records_and_resets() {
    let (mock, orm) = setup();
    mock.push_rows(vec![
        row! { "id" => 1, "name" => "a" },
        row! { "id" => 2, "name" => "b" },
    ]);

    let mut m = orm.model("items").unwrap();
    let records = m
        .where_("items.price < ?", params![10])
        .unwrap()
        .all()
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[1].get("name").unwrap(), &Value::from("b"));
    assert_eq!(records[0].table(), "items");
    assert!(!records[0].is_new());
    assert_eq!(m.op_mode(), OpMode::AfterReset);
    assert!(m.action_data().is_empty());

    let calls = mock.calls();
    assert_eq!(calls[0].sql, "SELECT items.* FROM items WHERE items.price < ?");
    assert_eq!(calls[0].values, params![10]);
}

#[tokio::test]
async fn first_limits_and_last_pops() {
    let (mock, orm) = setup();
    mock.push_rows(vec![row! { "id" => 3 }]);
    mock.push_rows(vec![row! { "id" => 1 }, row! { "id" => 2 }]);

    let mut m = orm.model("items").unwrap();
    let first = m.one("items.id = ?", params![3]).await.unwrap().unwrap();
    assert_eq!(first.id().unwrap(), &Value::Int(3));

    let last = m.order("items.id", true).unwrap().last().await.unwrap().unwrap();
    assert_eq!(last.id().unwrap(), &Value::Int(2));

    assert!(m.first().await.unwrap().is_none());

    let sql = mock.statements();
    assert_eq!(sql[0], "SELECT items.* FROM items WHERE items.id = ? LIMIT 1");
    assert_eq!(sql[1], "SELECT items.* FROM items ORDER BY items.id ASC");
    assert_eq!(sql[2], "SELECT items.* FROM items LIMIT 1");
}

#[tokio::test]
async fn raw_config_returns_rows() {
    let (mock, orm) = setup();
    mock.push_rows(vec![row! { "id" => 1 }]);
    mock.push_rows(vec![row! { "id" => 2 }]);

    let mut m = orm
        .model_with("logs", ModelConfig::default().raw(true))
        .unwrap();
    m.find(&[]).unwrap();
    let rows = m.end(DoOptions::default()).await.unwrap().into_rows().unwrap();
    assert_eq!(rows, vec![row! { "id" => 1 }]);

    // explicit record helpers ignore the raw setting
    let records = m.all().await.unwrap();
    assert_eq!(records[0].id().unwrap(), &Value::Int(2));
}

#[tokio::test]
async fn count_reads_count_column() {
    let (mock, orm) = setup();
    mock.push_rows(vec![row! { "count" => 3 }]);
    mock.push_rows(vec![row! { "count" => 2 }]);

    let mut m = orm.model("items").unwrap();
    m.count("id").unwrap().where_("items.proto_id = ?", params![7]).unwrap();
    assert_eq!(m.fetch_count().await.unwrap(), 3);

    m.count("DISTINCT items.proto_id").unwrap();
    assert_eq!(m.fetch_count().await.unwrap(), 2);

    let sql = mock.statements();
    assert_eq!(
        sql[0],
        "SELECT COUNT(items.id) AS count FROM items WHERE items.proto_id = ?"
    );
    assert_eq!(sql[1], "SELECT COUNT(DISTINCT items.proto_id) AS count FROM items");
}

#[tokio::test]
async fn insert_refetches_generated_id() {
    let (mock, orm) = setup();
    mock.push_result(DbResult::written(1, Some(9)));
    mock.push_rows(vec![row! { "id" => 9, "name" => "x" }]);

    let mut m = orm.model("items").unwrap();
    m.insert(row! { "name" => "x" }).unwrap();
    let record = m
        .end(DoOptions::default())
        .await
        .unwrap()
        .into_record()
        .unwrap()
        .unwrap();
    assert_eq!(record.get("name").unwrap(), &Value::from("x"));

    let calls = mock.calls();
    assert_eq!(calls[0].sql, "INSERT INTO `items` (name) VALUES (?)");
    assert_eq!(calls[1].sql, "SELECT items.* FROM items WHERE items.id = ? LIMIT 1");
    assert_eq!(calls[1].values, params![9]);
}

#[tokio::test]
async fn execute_skips_refetch() {
    let (mock, orm) = setup();
    mock.push_result(DbResult::written(1, Some(9)));

    let mut m = orm.model("items").unwrap();
    m.insert(row! { "name" => "x", "created_at" => Value::raw("NOW()") })
        .unwrap();
    let result = m.execute().await.unwrap();
    assert_eq!(result.insert_id, Some(9));
    assert_eq!(
        mock.statements(),
        ["INSERT INTO `items` (name, created_at) VALUES (?, NOW())"]
    );
    assert_eq!(mock.calls()[0].values, params!["x"]);
}

#[tokio::test]
async fn page_counts_and_fetches_window() {
    let (mock, orm) = setup();
    mock.push_rows(vec![row! { "count" => 45 }]);
    mock.push_rows(vec![row! { "id" => 21 }]);

    let mut m = orm.model("items").unwrap();
    m.order("items.id", true).unwrap().page(2, None).unwrap();
    let page = m.end(DoOptions::default()).await.unwrap().into_page().unwrap();

    assert!(page.paginate);
    assert_eq!((page.count, page.pages, page.page), (45, 3, 2));
    assert_eq!((page.limit, page.offset), (20, 20));
    assert_eq!(page.rows[0].id().unwrap(), &Value::Int(21));

    let sql = mock.statements();
    assert_eq!(sql[0], "SELECT COUNT(items.id) AS count FROM items");
    assert_eq!(
        sql[1],
        "SELECT items.* FROM items ORDER BY items.id ASC LIMIT 20 OFFSET 20"
    );
}

#[tokio::test]
async fn page_window_and_table_page_size() {
    let (mock, orm) = setup();
    mock.push_rows(vec![row! { "count" => 100 }]);
    mock.push_rows(vec![]);
    mock.push_rows(vec![row! { "count" => 0 }]);
    mock.push_rows(vec![]);

    let mut m = orm.model("items").unwrap();
    let page = m.do_page(PageRequest::window(40, 20)).await.unwrap();
    assert_eq!((page.page, page.pages), (3, 5));

    let mut small = orm
        .model_with("items", ModelConfig::default().page_size(5))
        .unwrap();
    let page = small.do_page(PageRequest::page(0)).await.unwrap();
    assert_eq!((page.page, page.limit, page.offset, page.pages), (1, 5, 0, 0));
    assert!(mock.statements()[3].contains("LIMIT 5"));
}

#[test]
fn where_map_builds_and_joined_conditions() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();
    m.where_map(row! {
        "proto_id" => 7,
        "items.kind" => [1, 2],
        "deleted_at" => Value::Null,
    })
    .unwrap();
    let built = m.to_param().unwrap();
    assert_eq!(
        built.text,
        "SELECT items.* FROM items WHERE items.proto_id = ? AND items.kind IN (1,2) AND items.deleted_at IS NULL"
    );
    assert_eq!(built.values, params![7]);
}

#[test]
fn where_map_appends_raw_fragments() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();
    m.where_map(row! {
        "proto_id" => 7,
        "_sql" => ["items.qty > 0", "items.price < 10"],
    })
    .unwrap();
    assert_eq!(
        m.to_sql_string().unwrap(),
        "SELECT items.* FROM items WHERE items.proto_id = 7 AND items.qty > 0 AND items.price < 10"
    );

    let mut m = orm.model("items").unwrap();
    let err = m.where_map(row! { "_sql" => 3 }).unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
}

#[test]
fn find_by_scalar_and_list() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();
    m.find_by("proto_id", [1, 2, 3]).unwrap();
    assert_eq!(
        m.to_sql_string().unwrap(),
        "SELECT items.* FROM items WHERE `items`.`proto_id` IN (1,2,3)"
    );
    m.find_by("name", "x").unwrap();
    assert_eq!(
        m.to_sql_string().unwrap(),
        "SELECT items.* FROM items WHERE `items`.`name` = 'x'"
    );
}

#[test]
fn joins_are_recorded() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();
    m.left_join("protos", "protos.id = items.proto_id", Some("p"))
        .unwrap();
    assert_eq!(
        m.to_sql_string().unwrap(),
        "SELECT items.* FROM items LEFT JOIN protos AS p ON protos.id = items.proto_id"
    );
    assert_eq!(m.action_data()[1].op, "left_join");
}

#[test]
fn scopes_apply_registered_fragments() {
    let (_, orm) = setup();
    orm.register_scope("items", "cheap", |m, args| {
        m.where_("items.price < ?", args.to_vec())?;
        Ok(())
    });
    orm.register_scope("protos", "live", |m, _| {
        m.where_("deleted_at IS NULL", params![])?;
        Ok(())
    });

    let mut m = orm.model("items").unwrap();
    m.scope("cheap", &params![10])
        .unwrap()
        .scope("missing", &[])
        .unwrap()
        .scope_from("protos", "live", &[])
        .unwrap();
    assert_eq!(
        m.to_sql_string().unwrap(),
        "SELECT items.* FROM items WHERE items.price < 10 AND deleted_at IS NULL"
    );
}

#[tokio::test]
async fn events_fire_after_success_unless_bypassed() {
    let (mock, orm) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    orm.on("items", EventKind::Update, move |e| {
        let ops = e.action_data.iter().map(|a| a.op).collect::<Vec<_>>().join(",");
        s.lock()
            .unwrap()
            .push((e.name(), e.params.text.clone(), ops));
    });

    let mut m = orm.model("items").unwrap();
    m.update(row! { "name" => "x" })
        .unwrap()
        .where_("items.id = ?", params![5])
        .unwrap();
    m.execute().await.unwrap();

    m.update(row! { "name" => "y" }).unwrap();
    m.end(DoOptions::default().bypass_events()).await.unwrap();

    m.find(&[]).unwrap();
    m.all().await.unwrap();

    mock.push_error(OrmError::execution("boom"));
    m.update(row! { "name" => "z" }).unwrap();
    assert!(m.execute().await.is_err());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "items.update");
    assert_eq!(seen[0].1, "UPDATE `items` SET name = ? WHERE items.id = ?");
    assert_eq!(seen[0].2, "update,where");
}

#[tokio::test]
async fn failed_execution_resets_and_keeps_sql() {
    let (mock, orm) = setup();
    mock.push_error(OrmError::execution("syntax error"));

    let mut m = orm.model("items").unwrap();
    m.where_("items.id = ?", params![1]).unwrap();
    let err = m.all().await.unwrap_err();
    assert_eq!(err.sql(), Some("SELECT items.* FROM items WHERE items.id = ?"));
    assert_eq!(m.op_mode(), OpMode::AfterReset);
}

#[tokio::test]
async fn transaction_wraps_write() {
    let (mock, orm) = setup();
    let mut m = orm.model("items").unwrap();
    m.delete()
        .unwrap()
        .where_("items.id IN ?", params![[1, 2]])
        .unwrap();
    m.execute_in_transaction().await.unwrap();
    assert_eq!(
        mock.statements(),
        ["BEGIN", "DELETE FROM `items` WHERE items.id IN (1,2)", "COMMIT"]
    );
}

#[tokio::test]
async fn end_in_transaction_refetches_after_commit() {
    let (mock, orm) = setup();
    mock.push_result(DbResult::written(1, Some(9)));
    mock.push_rows(vec![row! { "id" => 9, "name" => "n" }]);

    let mut m = orm.model("items").unwrap();
    m.insert(row! { "name" => "n" }).unwrap();
    let record = m
        .end_in_transaction(DoOptions::default())
        .await
        .unwrap()
        .into_record()
        .unwrap()
        .unwrap();
    assert_eq!(record.id().unwrap(), &Value::Int(9));
    assert_eq!(
        mock.statements(),
        [
            "BEGIN",
            "INSERT INTO `items` (name) VALUES (?)",
            "COMMIT",
            "SELECT items.* FROM items WHERE items.id = ? LIMIT 1",
        ]
    );
}

#[tokio::test]
async fn upsert_updates_existing_row() {
    let (mock, orm) = setup();
    mock.push_rows(vec![row! { "id" => 1, "sku" => "a" }]);

    let mut m = orm.model("items").unwrap();
    let outcome = m
        .upsert(row! { "qty" => 3 }, "items.sku = ?", params!["a"])
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Written(_)));
    assert_eq!(
        mock.statements(),
        [
            "SELECT items.* FROM items WHERE items.sku = ? LIMIT 1",
            "UPDATE `items` SET qty = ? WHERE items.sku = ?",
        ]
    );
}

#[tokio::test]
async fn upsert_inserts_missing_row() {
    let (mock, orm) = setup();

    let mut m = orm.model("items").unwrap();
    m.upsert(row! { "sku" => "b", "qty" => 1 }, "items.sku = ?", params!["b"])
        .await
        .unwrap();
    let calls = mock.calls();
    assert_eq!(calls[1].sql, "INSERT INTO `items` (sku, qty) VALUES (?, ?)");
    assert_eq!(calls[1].values, params!["b", 1]);
}

#[tokio::test]
async fn exists_checks_catalog() {
    let (mock, orm) = setup();
    mock.push_rows(vec![row! { "count" => 1 }]);

    let m = orm.model("items").unwrap();
    assert!(m.exists().await.unwrap());
    assert!(!m.exists().await.unwrap());

    let calls = mock.calls();
    assert_eq!(calls[0].sql, Dialect::Mysql.table_exists_sql());
    assert_eq!(calls[0].values, params!["items"]);
}

#[tokio::test]
async fn inlines_values_for_services_without_placeholders() {
    let mock = MockService::new().without_placeholders();
    let orm = mock_orm(&mock).unwrap();

    let mut m = orm.model("items").unwrap();
    m.update(row! { "name" => "x" })
        .unwrap()
        .where_("items.id = ?", params![5])
        .unwrap();
    m.execute().await.unwrap();
    let calls = mock.calls();
    assert_eq!(calls[0].sql, "UPDATE `items` SET name = 'x' WHERE items.id = 5");
    assert!(calls[0].values.is_empty());
}

#[test]
fn clone_is_independent() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();
    m.find(&["id"]).unwrap();
    let mut c = m.clone();
    c.where_("items.id = ?", params![1]).unwrap();
    assert_eq!(m.to_sql_string().unwrap(), "SELECT items.id FROM items");
    assert_eq!(m.action_data().len(), 1);
}

#[test]
fn empty_table_name_is_rejected() {
    let (_, orm) = setup();
    assert!(matches!(
        orm.model(" "),
        Err(OrmError::MissingTableName(_))
    ));
}

#[test]
fn fields_accumulate_after_field() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();
    m.find(&["id"])
        .unwrap()
        .field("a")
        .unwrap()
        .fields(&["b", "protos.c"])
        .unwrap();
    assert_eq!(
        m.to_sql_string().unwrap(),
        "SELECT items.id,items.a,items.b,protos.c FROM items"
    );
}

#[test]
fn out_of_range_page_is_rejected() {
    let (_, orm) = setup();
    let mut m = orm.model("items").unwrap();
    m.find(&[]).unwrap();
    let err = m.page(u64::MAX, Some(20)).unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
}

#[tokio::test]
async fn typed_finishers_reject_other_modes_before_io() {
    let (mock, orm) = setup();
    let mut m = orm.model("items").unwrap();

    m.update(row! { "a" => 1 })
        .unwrap()
        .where_("items.id = ?", params![1])
        .unwrap();
    assert!(m.all().await.unwrap_err().is_invalid_mode());
    assert!(m.rows().await.unwrap_err().is_invalid_mode());
    assert!(m.last().await.unwrap_err().is_invalid_mode());
    assert!(m.fetch_count().await.unwrap_err().is_invalid_mode());

    m.delete().unwrap().where_("items.id = ?", params![1]).unwrap();
    let err = m.first().await.unwrap_err();
    assert_eq!(err.to_string(), "cant run [first] in :delete mode");

    m.find(&[]).unwrap();
    assert!(m.execute().await.unwrap_err().is_invalid_mode());
    assert!(m.execute_in_transaction().await.unwrap_err().is_invalid_mode());

    m.reset();
    assert!(m.execute().await.unwrap_err().is_invalid_mode());

    assert_eq!(mock.call_count(), 0);
}
