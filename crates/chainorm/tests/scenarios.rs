use chainorm::testing::{MockService, mock_orm};
use chainorm::{OrmError, QueryBuilder, Value, params, row};

#[test]
fn select_renders_inlined() {
    let mut q = QueryBuilder::new();
    q.select("items", &["id", "name"])
        .unwrap()
        .where_("proto_id = ?", params![7])
        .unwrap()
        .order("name", true)
        .unwrap()
        .limit(10)
        .unwrap();
    assert_eq!(
        q.to_sql_string().unwrap(),
        "SELECT id,name FROM items WHERE proto_id = 7 ORDER BY name ASC LIMIT 10"
    );
}

#[test]
fn update_renders_placeholders() {
    let mut q = QueryBuilder::new();
    q.update("items")
        .unwrap()
        .update_fields(row! { "name" => "x" })
        .unwrap()
        .where_("id = ?", params![5])
        .unwrap();
    let built = q.to_param().unwrap();
    assert_eq!(built.text, "UPDATE `items` SET name = ? WHERE id = ?");
    assert_eq!(built.values, vec![Value::from("x"), Value::Int(5)]);
}

#[test]
fn raw_values_are_not_bound() {
    let mut q = QueryBuilder::new();
    q.insert("items")
        .unwrap()
        .insert_fields(row! { "name" => "x", "created_at" => Value::raw("NOW()") })
        .unwrap();
    let built = q.to_param().unwrap();
    assert_eq!(
        built.text,
        "INSERT INTO `items` (name, created_at) VALUES (?, NOW())"
    );
    assert_eq!(built.values, params!["x"]);

    q.update("items")
        .unwrap()
        .update_fields(row! { "updated_at" => Value::raw("NOW()") })
        .unwrap();
    let built = q.to_param().unwrap();
    assert_eq!(built.text, "UPDATE `items` SET updated_at = NOW()");
    assert!(built.values.is_empty());
}

#[test]
fn in_list_is_inlined() {
    let mut q = QueryBuilder::new();
    q.select("items", &[])
        .unwrap()
        .where_("id IN ?", params![[1, 2, 3]])
        .unwrap();
    assert_eq!(
        q.to_sql_string().unwrap(),
        "SELECT items.* FROM items WHERE id IN (1,2,3)"
    );
    let built = q.to_param().unwrap();
    assert_eq!(built.text, "SELECT items.* FROM items WHERE id IN (1,2,3)");
    assert!(built.values.is_empty());
}

#[test]
fn mode_violations_fail_at_build_time() {
    let mut q = QueryBuilder::new();
    let err = q
        .insert("t")
        .unwrap()
        .where_("x=1", params![])
        .unwrap_err();
    assert!(err.is_invalid_mode());
    assert_eq!(err.to_string(), "cant run [where] in :insert mode");

    let mut q = QueryBuilder::new();
    let err = q
        .select("t", &[])
        .unwrap()
        .extra_from(&["u"])
        .unwrap()
        .update_fields(row! { "a" => 1 })
        .unwrap_err();
    assert!(err.is_invalid_mode());
}

#[test]
fn mismatched_insert_keys_fail_before_execution() {
    let mut q = QueryBuilder::new();
    let err = q
        .insert("t")
        .unwrap()
        .insert_rows(vec![row! { "a" => 1 }, row! { "b" => 2 }])
        .unwrap_err();
    assert!(matches!(err, OrmError::MismatchedInsertKeys { row: 1, .. }));
    assert!(err.is_usage());
}

#[test]
fn clone_does_not_share_state() {
    let mut original = QueryBuilder::new();
    original.select("items", &["id"]).unwrap();
    let mut copy = original.clone();
    copy.where_("id = ?", params![1])
        .unwrap()
        .field("name")
        .unwrap();
    assert_eq!(original.to_sql_string().unwrap(), "SELECT id FROM items");
    assert_eq!(
        copy.to_sql_string().unwrap(),
        "SELECT id,name FROM items WHERE id = 1"
    );
}

#[tokio::test]
async fn pagination_of_45_rows() {
    let mock = MockService::new();
    mock.push_rows(vec![row! { "count" => 45 }]);
    mock.push_rows((21..=40).map(|id| row! { "id" => id }).collect());
    let orm = mock_orm(&mock).unwrap();

    let mut items = orm.model("items").unwrap();
    items.page(2, Some(20)).unwrap();
    let page = items
        .end(Default::default())
        .await
        .unwrap()
        .into_page()
        .unwrap();

    assert_eq!(page.offset, 20);
    assert_eq!(page.limit, 20);
    assert_eq!(page.pages, 3);
    assert_eq!(page.count, 45);
    assert_eq!(page.rows.len(), 20);
}

#[tokio::test]
async fn build_errors_never_reach_the_service() {
    let mock = MockService::new();
    let orm = mock_orm(&mock).unwrap();

    let mut items = orm.model("items").unwrap();
    items
        .where_("a = ? AND b = ?", params![1])
        .unwrap();
    let err = items.all().await.unwrap_err();
    assert!(matches!(err, OrmError::PlaceholderMismatch { .. }));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn unencodable_values_never_reach_the_service() {
    let mock = MockService::new().without_placeholders();
    let orm = mock_orm(&mock).unwrap();

    let mut items = orm.model("items").unwrap();
    items
        .update(row! { "ratio" => f64::NAN })
        .unwrap()
        .where_("id = ?", params![1])
        .unwrap();
    let err = items.execute().await.unwrap_err();
    assert!(matches!(err, OrmError::UnsupportedValueType(_)));
    assert_eq!(mock.call_count(), 0);
}
