use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    error::TRANSIENT_TRANSACTION_ERROR,
    Client, ClientSession, Collection, Database, IndexModel,
};

use super::{Repository, ITEM_ENTITY, MENU_ENTITY, QUESTION_ENTITY};
use crate::error::{RepoResult, RepositoryError};
use crate::metrics::track_repository_operation;
use crate::models::{Menu, MenuItem, QuestionFilter, Quiz};
use crate::utils::id::{ItemId, MenuId, QuestionId};

const MENUS: &str = "menus";
const MENU_ITEMS: &str = "menu_items";
const QUIZZES: &str = "quizzes";

/// MongoDB backend: one typed collection per entity, keyed by the string id.
///
/// Guarded writes run in a multi-document transaction, so the deployment
/// must be a replica set (a single-node one is enough).
#[derive(Clone)]
pub struct MongoRepository {
    client: Client,
    mongo: Database,
}

impl MongoRepository {
    pub fn new(client: Client, database: &str) -> Self {
        let mongo = client.database(database);
        Self { client, mongo }
    }

    pub async fn connect(uri: &str, database: &str) -> RepoResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        tracing::info!("MongoDB connected, using database {}", database);
        Ok(Self::new(client, database))
    }

    /// Creates the lookup indexes used by the query paths.
    pub async fn ensure_indexes(&self) -> RepoResult<()> {
        self.menus()
            .create_index(IndexModel::builder().keys(doc! { "parentId": 1 }).build())
            .await?;
        self.items()
            .create_index(IndexModel::builder().keys(doc! { "menuId": 1 }).build())
            .await?;
        self.items()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "content.targetMenuId": 1 })
                    .build(),
            )
            .await?;
        self.questions()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "category": 1, "difficulty": 1, "language": 1 })
                    .build(),
            )
            .await?;
        tracing::debug!("MongoDB indexes ensured");
        Ok(())
    }

    fn menus(&self) -> Collection<Menu> {
        self.mongo.collection(MENUS)
    }

    fn items(&self) -> Collection<MenuItem> {
        self.mongo.collection(MENU_ITEMS)
    }

    fn questions(&self) -> Collection<Quiz> {
        self.mongo.collection(QUIZZES)
    }

    async fn find_menu(&self, id: &MenuId) -> RepoResult<Menu> {
        self.menus()
            .find_one(doc! { "_id": id.as_str() })
            .await?
            .ok_or_else(|| RepositoryError::not_found(MENU_ENTITY, id))
    }

    async fn insert_menu(&self, menu: &Menu) -> RepoResult<Menu> {
        self.menus().insert_one(menu).await?;
        Ok(menu.clone())
    }

    async fn replace_menu_versioned(&self, menu: &Menu) -> RepoResult<Menu> {
        let mut next = menu.clone();
        next.version += 1;

        let result = self
            .menus()
            .replace_one(
                doc! { "_id": menu.id.as_str(), "version": menu.version },
                &next,
            )
            .await?;

        if result.matched_count == 0 {
            let exists = self
                .menus()
                .count_documents(doc! { "_id": menu.id.as_str() })
                .await?
                > 0;
            return Err(if exists {
                RepositoryError::conflict(MENU_ENTITY, &menu.id)
            } else {
                RepositoryError::not_found(MENU_ENTITY, &menu.id)
            });
        }

        Ok(next)
    }

    async fn reparent_menu_guarded(&self, menu: &Menu, guard: &[Menu]) -> RepoResult<Menu> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        match self.reparent_in_session(&mut session, menu, guard).await {
            Ok(next) => {
                session.commit_transaction().await?;
                Ok(next)
            }
            Err(e) => {
                let _ = session.abort_transaction().await;
                Err(transaction_conflict(e, &menu.id))
            }
        }
    }

    async fn reparent_in_session(
        &self,
        session: &mut ClientSession,
        menu: &Menu,
        guard: &[Menu],
    ) -> RepoResult<Menu> {
        self.bump_guard(session, guard).await?;

        let mut next = menu.clone();
        next.version += 1;
        let result = self
            .menus()
            .replace_one(
                doc! { "_id": menu.id.as_str(), "version": menu.version },
                &next,
            )
            .session(&mut *session)
            .await?;
        if result.matched_count == 0 {
            return Err(RepositoryError::conflict(MENU_ENTITY, &menu.id));
        }
        Ok(next)
    }

    /// Increments the version of every guard menu still at its read version;
    /// `Conflict` on the first one that moved on.
    async fn bump_guard(&self, session: &mut ClientSession, guard: &[Menu]) -> RepoResult<()> {
        for expected in guard {
            let result = self
                .menus()
                .update_one(
                    doc! { "_id": expected.id.as_str(), "version": expected.version },
                    doc! { "$inc": { "version": 1_i64 } },
                )
                .session(&mut *session)
                .await?;
            if result.matched_count == 0 {
                return Err(RepositoryError::conflict(MENU_ENTITY, &expected.id));
            }
        }
        Ok(())
    }

    async fn remove_menu(&self, id: &MenuId) -> RepoResult<()> {
        let result = self.menus().delete_one(doc! { "_id": id.as_str() }).await?;
        if result.deleted_count == 0 {
            return Err(RepositoryError::not_found(MENU_ENTITY, id));
        }
        Ok(())
    }

    async fn find_children(&self, parent: Option<&MenuId>) -> RepoResult<Vec<Menu>> {
        let filter = match parent {
            Some(id) => doc! { "parentId": id.as_str() },
            None => doc! { "parentId": null },
        };
        let cursor = self.menus().find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_item(&self, id: &ItemId) -> RepoResult<MenuItem> {
        self.items()
            .find_one(doc! { "_id": id.as_str() })
            .await?
            .ok_or_else(|| RepositoryError::not_found(ITEM_ENTITY, id))
    }

    async fn insert_item(&self, item: &MenuItem, guard: &[Menu]) -> RepoResult<MenuItem> {
        if guard.is_empty() {
            self.items().insert_one(item).await?;
            return Ok(item.clone());
        }

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let outcome = match self.bump_guard(&mut session, guard).await {
            Ok(()) => self
                .items()
                .insert_one(item)
                .session(&mut session)
                .await
                .map_err(RepositoryError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(_) => {
                session.commit_transaction().await?;
                Ok(item.clone())
            }
            Err(e) => {
                let _ = session.abort_transaction().await;
                Err(transaction_conflict(e, &item.menu_id))
            }
        }
    }

    async fn replace_item(&self, item: &MenuItem) -> RepoResult<MenuItem> {
        let result = self
            .items()
            .replace_one(doc! { "_id": item.id.as_str() }, item)
            .await?;
        if result.matched_count == 0 {
            return Err(RepositoryError::not_found(ITEM_ENTITY, &item.id));
        }
        Ok(item.clone())
    }

    async fn remove_item(&self, id: &ItemId) -> RepoResult<()> {
        let result = self.items().delete_one(doc! { "_id": id.as_str() }).await?;
        if result.deleted_count == 0 {
            return Err(RepositoryError::not_found(ITEM_ENTITY, id));
        }
        Ok(())
    }

    async fn find_items(&self, filter: Document) -> RepoResult<Vec<MenuItem>> {
        let cursor = self.items().find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_question(&self, id: &QuestionId) -> RepoResult<Quiz> {
        self.questions()
            .find_one(doc! { "_id": id.as_str() })
            .await?
            .ok_or_else(|| RepositoryError::not_found(QUESTION_ENTITY, id))
    }

    async fn insert_question(&self, quiz: &Quiz) -> RepoResult<Quiz> {
        self.questions().insert_one(quiz).await?;
        Ok(quiz.clone())
    }

    async fn replace_question(&self, quiz: &Quiz) -> RepoResult<Quiz> {
        let result = self
            .questions()
            .replace_one(doc! { "_id": quiz.id.as_str() }, quiz)
            .await?;
        if result.matched_count == 0 {
            return Err(RepositoryError::not_found(QUESTION_ENTITY, &quiz.id));
        }
        Ok(quiz.clone())
    }

    async fn remove_question(&self, id: &QuestionId) -> RepoResult<()> {
        let result = self
            .questions()
            .delete_one(doc! { "_id": id.as_str() })
            .await?;
        if result.deleted_count == 0 {
            return Err(RepositoryError::not_found(QUESTION_ENTITY, id));
        }
        Ok(())
    }

    async fn find_questions(&self, filter: &QuestionFilter) -> RepoResult<Vec<Quiz>> {
        let cursor = self.questions().find(question_filter_doc(filter)).await?;
        Ok(cursor.try_collect().await?)
    }
}

/// A write conflict inside a transaction means another writer touched the
/// same menus first.
fn transaction_conflict(err: RepositoryError, id: &MenuId) -> RepositoryError {
    match err {
        RepositoryError::Mongo(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
            RepositoryError::conflict(MENU_ENTITY, id)
        }
        other => other,
    }
}

fn question_filter_doc(filter: &QuestionFilter) -> Document {
    let mut query = Document::new();
    if let Some(category) = &filter.category {
        query.insert("category", category.as_str());
    }
    if let Some(difficulty) = filter.difficulty {
        query.insert("difficulty", difficulty.as_str());
    }
    if let Some(language) = &filter.language {
        query.insert("language", language.as_str());
    }
    query
}

#[async_trait]
impl Repository for MongoRepository {
    async fn get_menu(&self, id: &MenuId) -> RepoResult<Menu> {
        track_repository_operation("get", MENU_ENTITY, self.find_menu(id)).await
    }

    async fn create_menu(&self, menu: &Menu) -> RepoResult<Menu> {
        track_repository_operation("create", MENU_ENTITY, self.insert_menu(menu)).await
    }

    async fn update_menu(&self, menu: &Menu) -> RepoResult<Menu> {
        track_repository_operation("update", MENU_ENTITY, self.replace_menu_versioned(menu)).await
    }

    async fn reparent_menu(&self, menu: &Menu, guard: &[Menu]) -> RepoResult<Menu> {
        track_repository_operation(
            "reparent",
            MENU_ENTITY,
            self.reparent_menu_guarded(menu, guard),
        )
        .await
    }

    async fn delete_menu(&self, id: &MenuId) -> RepoResult<()> {
        track_repository_operation("delete", MENU_ENTITY, self.remove_menu(id)).await
    }

    async fn query_children(&self, parent: Option<&MenuId>) -> RepoResult<Vec<Menu>> {
        track_repository_operation("query_children", MENU_ENTITY, self.find_children(parent))
            .await
    }

    async fn get_item(&self, id: &ItemId) -> RepoResult<MenuItem> {
        track_repository_operation("get", ITEM_ENTITY, self.find_item(id)).await
    }

    async fn create_item(&self, item: &MenuItem, guard: &[Menu]) -> RepoResult<MenuItem> {
        track_repository_operation("create", ITEM_ENTITY, self.insert_item(item, guard)).await
    }

    async fn update_item(&self, item: &MenuItem) -> RepoResult<MenuItem> {
        track_repository_operation("update", ITEM_ENTITY, self.replace_item(item)).await
    }

    async fn delete_item(&self, id: &ItemId) -> RepoResult<()> {
        track_repository_operation("delete", ITEM_ENTITY, self.remove_item(id)).await
    }

    async fn query_items(&self, menu_id: &MenuId) -> RepoResult<Vec<MenuItem>> {
        track_repository_operation(
            "query_items",
            ITEM_ENTITY,
            self.find_items(doc! { "menuId": menu_id.as_str() }),
        )
        .await
    }

    async fn query_submenu_links(&self, target: &MenuId) -> RepoResult<Vec<MenuItem>> {
        track_repository_operation(
            "query_submenu_links",
            ITEM_ENTITY,
            self.find_items(doc! {
                "content.type": "submenu",
                "content.targetMenuId": target.as_str(),
            }),
        )
        .await
    }

    async fn get_question(&self, id: &QuestionId) -> RepoResult<Quiz> {
        track_repository_operation("get", QUESTION_ENTITY, self.find_question(id)).await
    }

    async fn create_question(&self, quiz: &Quiz) -> RepoResult<Quiz> {
        track_repository_operation("create", QUESTION_ENTITY, self.insert_question(quiz)).await
    }

    async fn update_question(&self, quiz: &Quiz) -> RepoResult<Quiz> {
        track_repository_operation("update", QUESTION_ENTITY, self.replace_question(quiz)).await
    }

    async fn delete_question(&self, id: &QuestionId) -> RepoResult<()> {
        track_repository_operation("delete", QUESTION_ENTITY, self.remove_question(id)).await
    }

    async fn query_questions(&self, filter: &QuestionFilter) -> RepoResult<Vec<Quiz>> {
        track_repository_operation("query_questions", QUESTION_ENTITY, self.find_questions(filter))
            .await
    }
}
