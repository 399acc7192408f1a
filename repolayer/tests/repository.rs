use bson::{Document, doc};
use repolayer::{memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Entity)]
#[serde(rename_all = "PascalCase")]
#[entity(collection = "people")]
struct Person {
    #[entity(id)]
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[entity(tracker)]
    #[serde(skip)]
    tracker: TrackerState,
    name: String,
    age: i32,
    city: Option<String>,
    bio: String,
}

/// Stores its identifier under `id` rather than `_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
struct Note {
    id: Option<String>,
    #[serde(skip)]
    tracker: TrackerState,
    text: String,
}

fn person(name: &str, age: i32, city: Option<&str>, bio: &str) -> Person {
    Person {
        name: name.to_string(),
        age,
        city: city.map(str::to_string),
        bio: bio.to_string(),
        ..Default::default()
    }
}

async fn seeded(context: &DbContext<InMemoryStore>) -> Vec<Person> {
    let people = context.repository::<Person>();
    let mut stored = Vec::new();

    for entity in [
        person("Ana", 31, Some("Madrid"), "Plays the guitar on weekends"),
        person("Bruno", 45, Some("Lima"), "Collects vinyl records"),
        person("Carla", 27, None, "Guitar teacher and composer"),
        person("Diego", 31, Some("Lima"), "Runs marathons"),
    ] {
        stored.push(people.add(entity).await.unwrap());
    }

    stored
}

fn names(people: &[Person]) -> Vec<&str> {
    people
        .iter()
        .map(|person| person.name.as_str())
        .collect()
}

#[tokio::test]
async fn add_assigns_identifier_and_round_trips() {
    let context = DbContext::new(InMemoryStore::new());
    let people = context.repository::<Person>();

    let ana = people
        .add(person("Ana", 31, Some("Madrid"), "Plays the guitar"))
        .await
        .unwrap();
    let id = ana.id.clone().unwrap();

    assert_eq!(people.collection_name(), "people");
    assert_eq!(ana.tracker, TrackerState::Unchanged);
    assert!(people.exists(&id).await.unwrap());
    assert_eq!(people.find(&id).await.unwrap(), Some(ana));
    assert_eq!(people.find("missing").await.unwrap(), None);
}

#[tokio::test]
async fn unbound_repository_rejects_operations() {
    fn unbound(result: DocumentStoreResult<impl std::fmt::Debug>) -> bool {
        matches!(
            result,
            Err(DocumentStoreError::RepositoryContextNotInitialized(owner)) if owner == "Repository<Person>"
        )
    }

    let context = DbContext::new(InMemoryStore::new());
    let mut people = Repository::<InMemoryStore, Person>::new(None);
    let stored = Person {
        id: Some("abc".to_string()),
        ..person("Ana", 31, None, "")
    };

    assert!(unbound(people.add(Person::default()).await));
    assert!(unbound(people.update(stored.clone()).await));
    assert!(unbound(people.delete(stored.clone()).await));
    assert!(unbound(people.find("abc").await));
    assert!(unbound(people.find_by(&Filter::parse(None, "Name_eq=Ana").unwrap()).await));
    assert!(unbound(people.list(&Predicate::eq("Name", "Ana")).await));
    assert!(unbound(people.stats().await));
    assert!(!people.is_initialized());

    people.initialize(&context);

    assert!(people.is_initialized());
    assert_eq!(people.add(stored).await.unwrap().tracker, TrackerState::Unchanged);
    assert_eq!(names(&people.list(&Predicate::eq("Name", "Ana")).await.unwrap()), ["Ana"]);
}

#[tokio::test]
async fn update_and_delete_follow_identity_rules() {
    let context = DbContext::new(InMemoryStore::new());
    let people = context.repository::<Person>();

    let err = people.update(person("Ghost", 1, None, "")).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::IncoherentEntityState(name) if name == "Person"));

    let mut ana = people.add(person("Ana", 31, None, "")).await.unwrap();
    let id = ana.id.clone().unwrap();
    ana.age = 32;
    ana.tracker = TrackerState::Modified;

    let ana = people.update(ana).await.unwrap();
    assert_eq!(ana.tracker, TrackerState::Unchanged);
    assert_eq!(people.find(&id).await.unwrap().map(|found| found.age), Some(32));

    people.delete(ana).await.unwrap();
    assert!(!people.exists(&id).await.unwrap());

    let err = people.find("   ").await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidArgument(argument) if argument == "id"));
}

#[tokio::test]
async fn entities_without_document_key_are_rejected() {
    let context = DbContext::new(InMemoryStore::new());
    let notes = context.repository::<Note>();

    let err = notes.add(Note::default()).await.unwrap_err();

    assert!(matches!(err, DocumentStoreError::PropertyIdNotFound(name) if name == "Note"));
    assert_eq!(notes.collection_name(), "Note");
}

#[tokio::test]
async fn filter_expressions_select_and_sort() {
    let context = DbContext::new(InMemoryStore::new());
    seeded(&context).await;
    let people = context.repository::<Person>();

    let found = people
        .find_by(&Filter::parse(Some("Name_desc"), "Age_in=(31,45)").unwrap())
        .await
        .unwrap();
    assert_eq!(names(&found), ["Diego", "Bruno", "Ana"]);

    let found = people
        .find_by(&Filter::parse(None, "City_eq=#").unwrap())
        .await
        .unwrap();
    assert_eq!(names(&found), ["Carla"]);

    let found = people
        .find_by(&Filter::parse(Some("Age_asc"), "City_in=('Lima',#)&Name_noteq=Diego").unwrap())
        .await
        .unwrap();
    assert_eq!(names(&found), ["Carla", "Bruno"]);

    let found = people
        .find_by(&Filter::parse(Some("Name_ASC"), "Name_eq=Carla|Name_eq=Ana").unwrap())
        .await
        .unwrap();
    assert_eq!(names(&found), ["Ana", "Carla"]);

    let found = people
        .find_by(&Filter::parse(None, "").unwrap())
        .await
        .unwrap();
    assert!(found.is_empty());

    assert!(matches!(
        Filter::<Person>::parse(None, "Age_between=3"),
        Err(DocumentStoreError::InvalidExpression(_))
    ));
}

#[tokio::test]
async fn fluent_filters_and_predicates() {
    let context = DbContext::new(InMemoryStore::new());
    seeded(&context).await;
    let people = context.repository::<Person>();

    let filter = Filter::new()
        .and_eq("Age", 31)
        .and_not_eq("City", "Madrid")
        .or_eq("Name", "Bruno")
        .sort_by(Sort::new("Name", SortDirection::Asc));
    assert_eq!(names(&people.find_by(&filter).await.unwrap()), ["Bruno", "Diego"]);

    let older = people.list(&Predicate::gt("Age", 30)).await.unwrap();
    assert_eq!(older.len(), 3);
    assert_eq!(people.list_entities().await.unwrap().len(), 4);
}

#[tokio::test]
async fn text_search_requires_a_text_index() {
    let context = DbContext::new(InMemoryStore::new());
    seeded(&context).await;
    let people = context.repository::<Person>();
    let guitarists = Filter::new().and_text("guitar");

    assert!(people.find_by(&guitarists).await.is_err());

    people
        .indexes()
        .unwrap()
        .create_index(IndexSpec::new("bio_text", vec![IndexField::text("Bio")]))
        .await
        .unwrap();

    let mut found = people.find_by(&guitarists).await.unwrap();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(names(&found), ["Ana", "Carla"]);

    let found = people
        .find_by(&Filter::parse(Some("Name_desc"), "Bio_text=guitar").unwrap())
        .await
        .unwrap();
    assert_eq!(names(&found), ["Carla", "Ana"]);

    let indexes = people.indexes().unwrap().list_indexes().await.unwrap();
    let index_names: Vec<&str> = indexes
        .iter()
        .filter_map(|index| index.get_str("name").ok())
        .collect();
    assert_eq!(index_names, ["_id_", "bio_text"]);
}

#[tokio::test]
async fn text_index_options_come_from_index_properties() {
    let context = DbContext::new(InMemoryStore::new());
    let people = context.repository::<Person>();
    let indexes = people.indexes().unwrap();

    indexes
        .create_index_with_properties(
            IndexSpec::new("bio_text", vec![IndexField::text("Bio")]),
            &doc! { "DefaultLanguage": "english", "TextIndexVersion": 2 },
        )
        .await
        .unwrap();

    let listed = indexes.list_indexes().await.unwrap();
    let text = listed
        .iter()
        .find(|index| index.get_str("name").ok() == Some("bio_text"))
        .unwrap();

    assert_eq!(text.get_str("default_language").ok(), Some("english"));
    assert_eq!(text.get_i32("textIndexVersion").ok(), Some(2));
}

#[tokio::test]
async fn unique_indexes_reject_duplicates() {
    let context = DbContext::new(InMemoryStore::new());
    let people = context.repository::<Person>();

    people
        .indexes()
        .unwrap()
        .create_index(IndexSpec::new(" by_name ", vec![IndexField::ascending("Name")]).unique(true))
        .await
        .unwrap();
    people.add(person("Ana", 31, None, "")).await.unwrap();

    let err = people.add(person("Ana", 40, None, "")).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::DocumentAlreadyExists(_, collection) if collection == "people"));

    let blank = people
        .indexes()
        .unwrap()
        .create_index(IndexSpec::new("  ", vec![IndexField::ascending("Name")]))
        .await;
    assert!(matches!(blank, Err(DocumentStoreError::InvalidArgument(argument)) if argument == "name"));
}

#[tokio::test]
async fn statistics_and_bulk_removal() {
    let context = DbContext::new(InMemoryStore::new());
    seeded(&context).await;
    let people = context.repository::<Person>();

    let size = people.size().await.unwrap();
    assert_eq!(people.count().await.unwrap(), 4);
    assert!(size > 0);
    assert!(people.index_size().await.unwrap() > 0);
    assert!(people.total_size().await.unwrap() > size);

    assert_eq!(people.delete_all().await.unwrap(), 4);
    assert_eq!(people.count().await.unwrap(), 0);

    people.drop_collection().await.unwrap();
    assert_eq!(people.size().await.unwrap(), 0);
}

#[tokio::test]
async fn projections_page_through_selected_fields() {
    let context = DbContext::new(InMemoryStore::new());
    let stored = seeded(&context).await;
    let people = context.repository::<Person>();

    let page = people
        .project(&ProjectionQuery::new().include("Name").page(2).page_size(3))
        .await
        .unwrap();
    assert_eq!((page.count, page.page, page.page_size), (4, 2, 3));
    assert_eq!(page.result.len(), 1);
    assert_eq!(page.result[0].keys(), ["Id", "Name"]);
    assert_eq!(page.result[0].get("Id").and_then(|id| id.as_str()), stored[3].id.as_deref());

    let page = people
        .project(
            &ProjectionQuery::new()
                .exclude("Bio")
                .page_size(10)
                .naming_strategy(NamingStrategy::CamelCase),
        )
        .await
        .unwrap();
    assert_eq!((page.page, page.page_size), (1, 4));
    assert_eq!(page.result[0].keys(), ["id", "name", "age", "city"]);
    assert!(page.result[0].field_names().shares_with(page.result[3].field_names()));

    let json = serde_json::to_value(&page).unwrap();
    assert_eq!(json["pageSize"], 4);
    assert_eq!(json["result"][1]["name"], "Bruno");
}

#[tokio::test]
async fn projection_query_from_request_pairs() {
    let context = DbContext::new(InMemoryStore::new());
    seeded(&context).await;
    let people = context.repository::<Person>();

    let query = ProjectionQuery::from_pairs([("@Page", "1"), ("@PageSize", "2"), ("Age", "1"), ("_id", "1")]);
    let page = people.project(&query).await.unwrap();

    assert_eq!((page.count, page.page, page.page_size), (4, 1, 2));
    assert_eq!(page.result[1].keys(), ["Id", "Age"]);
}

#[tokio::test]
async fn document_repository_handles_raw_documents() {
    let context = DbContext::new(InMemoryStore::new());
    let events = context.document_repository(" events ").unwrap();

    assert_eq!(events.collection_name(), "events");
    assert!(matches!(
        context.document_repository("  "),
        Err(DocumentStoreError::InvalidArgument(argument)) if argument == "collection"
    ));

    let mut login = events.add(doc! { "Kind": "login", "User": "ana" }).await.unwrap();
    events.add(doc! { "Kind": "logout", "User": "ana" }).await.unwrap();
    assert!(login.contains_key("_id"));

    login.insert("User", "bruno");
    events.update(login.clone()).await.unwrap();

    let found = events
        .find_by(&Filter::<Document>::parse(None, "User_eq=bruno").unwrap())
        .await
        .unwrap();
    assert_eq!(found, vec![login.clone()]);

    let err = events.update(doc! { "Kind": "orphan" }).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::PropertyIdNotFound(_)));

    events.delete(login).await.unwrap();
    assert_eq!(events.list_all().await.unwrap().len(), 1);
    assert_eq!(events.list(&Predicate::eq("Kind", "logout")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn contexts_can_borrow_a_shared_store() {
    let store = InMemoryStore::new();

    {
        let context = DbContext::new(&store);
        let people = context.repository_named::<Person>("staff");
        people.add(person("Ana", 31, None, "")).await.unwrap();
    }

    assert_eq!(store.count("staff", None).await.unwrap(), 1);
    assert_eq!(store.collection_names().await, ["staff"]);
}

#[tokio::test]
async fn transactions_are_skipped_without_backend_support() {
    let context = DbContext::new(InMemoryStore::new());

    context.begin_transaction().await.unwrap();
    assert!(!context.in_transaction());

    let people = context.repository::<Person>();
    people.add(person("Ana", 31, None, "")).await.unwrap();

    context.rollback_changes().await.unwrap();
    assert_eq!(people.count().await.unwrap(), 1);

    context.commit_changes().await.unwrap();
    context.shutdown().await.unwrap();
}
