use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::{category::CATEGORY_COLUMNS, Category, CategoryInput, CategoryQuery, CategoryUpdate},
    policy::{authorize, scoped_owner, Action},
    response::{self, Page, PageQuery},
    security::{contains_pattern, normalize_search},
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

async fn fetch_category(pool: &PgPool, id: Uuid) -> Result<Category, AppError> {
    sqlx::query_as::<_, Category>(&format!(
        "SELECT {} FROM categories WHERE id = $1",
        CATEGORY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Category not found".into()))
}

fn push_category_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &CategoryQuery) {
    if let Some(search) = normalize_search(query.search.as_deref()) {
        let pattern = contains_pattern(&search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category_type) = query.category_type {
        qb.push(" AND type = ").push_bind(category_type);
    }
}

/// Lists categories, filterable by `search` and `type`.
#[get("")]
pub async fn get_categories(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<CategoryQuery>,
    page: web::Query<PageQuery>,
) -> Result<impl Responder, AppError> {
    let owner = scoped_owner(&user, query.user_id)?;

    let mut count =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM categories WHERE user_id = ");
    count.push_bind(owner);
    push_category_filters(&mut count, &query);
    let (total,) = count.build_query_as::<(i64,)>().fetch_one(&**pool).await?;

    let mut select = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM categories WHERE user_id = ",
        CATEGORY_COLUMNS
    ));
    select.push_bind(owner);
    push_category_filters(&mut select, &query);
    select
        .push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let categories = select.build_query_as::<Category>().fetch_all(&**pool).await?;

    Ok(response::ok(Page::new(categories, total, &page)))
}

#[post("")]
pub async fn create_category(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    category_data: web::Json<CategoryInput>,
) -> Result<impl Responder, AppError> {
    category_data.validate()?;
    let category = Category::new(category_data.into_inner(), user.id);

    let created = sqlx::query_as::<_, Category>(&format!(
        "INSERT INTO categories (id, user_id, name, type, description, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
        CATEGORY_COLUMNS
    ))
    .bind(category.id)
    .bind(category.user_id)
    .bind(&category.name)
    .bind(category.category_type)
    .bind(&category.description)
    .bind(category.created_at)
    .bind(category.updated_at)
    .fetch_one(&**pool)
    .await?;

    Ok(response::created("Category created", created))
}

#[get("/{id}")]
pub async fn get_category(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    category_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let category = fetch_category(&pool, category_id.into_inner()).await?;
    authorize(&user, &category, Action::View)?;
    Ok(response::ok(category))
}

#[put("/{id}")]
pub async fn update_category(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    category_id: web::Path<Uuid>,
    category_data: web::Json<CategoryUpdate>,
) -> Result<impl Responder, AppError> {
    category_data.validate()?;
    let mut category = fetch_category(&pool, category_id.into_inner()).await?;
    authorize(&user, &category, Action::Update)?;

    category.apply(category_data.into_inner(), Utc::now());
    let saved = sqlx::query_as::<_, Category>(&format!(
        "UPDATE categories SET name = $2, type = $3, description = $4, updated_at = $5 \
         WHERE id = $1 RETURNING {}",
        CATEGORY_COLUMNS
    ))
    .bind(category.id)
    .bind(&category.name)
    .bind(category.category_type)
    .bind(&category.description)
    .bind(category.updated_at)
    .fetch_one(&**pool)
    .await?;

    Ok(response::ok_with_message("Category updated", saved))
}

/// Deletes a category. Its tasks survive with `category_id` cleared.
#[delete("/{id}")]
pub async fn delete_category(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    category_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let category = fetch_category(&pool, category_id.into_inner()).await?;
    authorize(&user, &category, Action::Delete)?;

    sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(category.id)
        .execute(&**pool)
        .await?;

    log::info!("User {} deleted category {}", user.id, category.id);
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryType;

    #[test]
    fn test_category_filters() {
        let query = CategoryQuery {
            search: Some("home".to_string()),
            category_type: Some(CategoryType::Personal),
            user_id: None,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM categories WHERE user_id = ");
        qb.push_bind(1);
        push_category_filters(&mut qb, &query);
        assert!(qb.sql().ends_with(
            "AND (name ILIKE $2 OR description ILIKE $3) AND type = $4"
        ));
    }
}
