/// Employee directory lookups for the public check-in flow
use crate::{
    db::models::Employee,
    error::{PatrolError, PatrolResult},
};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct EmployeeDirectory {
    db: SqlitePool,
}

impl EmployeeDirectory {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: i64) -> PatrolResult<Employee> {
        sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PatrolError::NotFound("Employee not found".to_string()))
    }

    pub async fn find_by_name(&self, name: &str) -> PatrolResult<Option<Employee>> {
        Ok(
            sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE name = ? ORDER BY id")
                .bind(name.trim())
                .fetch_optional(&self.db)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_employee, test_pool};

    #[tokio::test]
    async fn test_lookup_by_id_and_name() {
        let db = test_pool().await;
        let dir = EmployeeDirectory::new(db.clone());

        let id = insert_employee(&db, "王小明").await;
        assert_eq!(dir.get(id).await.unwrap().name, "王小明");
        assert!(dir.get(id + 99).await.is_err());

        let found = dir.find_by_name("王小明").await.unwrap();
        assert_eq!(found.unwrap().id, id);
        assert!(dir.find_by_name("不存在").await.unwrap().is_none());
    }
}
