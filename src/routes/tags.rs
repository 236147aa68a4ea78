use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::{tag::TAG_COLUMNS, Tag, TagInput, TagQuery, TagUpdate},
    policy::{authorize, scoped_owner, Action},
    response::{self, Page, PageQuery},
    security::{contains_pattern, normalize_search},
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

async fn fetch_tag(pool: &PgPool, id: Uuid) -> Result<Tag, AppError> {
    sqlx::query_as::<_, Tag>(&format!("SELECT {} FROM tags WHERE id = $1", TAG_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Tag not found".into()))
}

/// Maps the `(user_id, name)` unique violation to a readable conflict.
fn duplicate_name(err: AppError) -> AppError {
    match err {
        AppError::Conflict(_) => AppError::Conflict("A tag with this name already exists".into()),
        other => other,
    }
}

/// Lists tags, most used first.
#[get("")]
pub async fn get_tags(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<TagQuery>,
    page: web::Query<PageQuery>,
) -> Result<impl Responder, AppError> {
    let owner = scoped_owner(&user, query.user_id)?;
    let search = normalize_search(query.search.as_deref()).map(|term| contains_pattern(&term));

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tags WHERE user_id = ");
    count.push_bind(owner);
    if let Some(pattern) = &search {
        count.push(" AND name ILIKE ").push_bind(pattern.clone());
    }
    let (total,) = count.build_query_as::<(i64,)>().fetch_one(&**pool).await?;

    let mut select =
        QueryBuilder::<Postgres>::new(format!("SELECT {} FROM tags WHERE user_id = ", TAG_COLUMNS));
    select.push_bind(owner);
    if let Some(pattern) = search {
        select.push(" AND name ILIKE ").push_bind(pattern);
    }
    select
        .push(" ORDER BY usage_count DESC, name ASC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let tags = select.build_query_as::<Tag>().fetch_all(&**pool).await?;

    Ok(response::ok(Page::new(tags, total, &page)))
}

/// Creates a tag; names are unique per user (`409` on a duplicate).
#[post("")]
pub async fn create_tag(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    tag_data: web::Json<TagInput>,
) -> Result<impl Responder, AppError> {
    tag_data.validate()?;
    let tag = Tag::new(tag_data.into_inner(), user.id);

    let created = sqlx::query_as::<_, Tag>(&format!(
        "INSERT INTO tags (id, user_id, name, color, usage_count, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
        TAG_COLUMNS
    ))
    .bind(tag.id)
    .bind(tag.user_id)
    .bind(&tag.name)
    .bind(&tag.color)
    .bind(tag.usage_count)
    .bind(tag.created_at)
    .bind(tag.updated_at)
    .fetch_one(&**pool)
    .await
    .map_err(|e| duplicate_name(e.into()))?;

    Ok(response::created("Tag created", created))
}

#[get("/{id}")]
pub async fn get_tag(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    tag_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let tag = fetch_tag(&pool, tag_id.into_inner()).await?;
    authorize(&user, &tag, Action::View)?;
    Ok(response::ok(tag))
}

#[put("/{id}")]
pub async fn update_tag(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    tag_id: web::Path<Uuid>,
    tag_data: web::Json<TagUpdate>,
) -> Result<impl Responder, AppError> {
    tag_data.validate()?;
    let mut tag = fetch_tag(&pool, tag_id.into_inner()).await?;
    authorize(&user, &tag, Action::Update)?;

    tag.apply(tag_data.into_inner(), Utc::now());
    let saved = sqlx::query_as::<_, Tag>(&format!(
        "UPDATE tags SET name = $2, color = $3, updated_at = $4 WHERE id = $1 RETURNING {}",
        TAG_COLUMNS
    ))
    .bind(tag.id)
    .bind(&tag.name)
    .bind(&tag.color)
    .bind(tag.updated_at)
    .fetch_one(&**pool)
    .await
    .map_err(|e| duplicate_name(e.into()))?;

    Ok(response::ok_with_message("Tag updated", saved))
}

/// Deletes a tag; its task links go with it.
#[delete("/{id}")]
pub async fn delete_tag(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    tag_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let tag = fetch_tag(&pool, tag_id.into_inner()).await?;
    authorize(&user, &tag, Action::Delete)?;

    sqlx::query("DELETE FROM tags WHERE id = $1")
        .bind(tag.id)
        .execute(&**pool)
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_name_rewrites_conflicts_only() {
        match duplicate_name(AppError::Conflict("duplicate key".into())) {
            AppError::Conflict(msg) => assert_eq!(msg, "A tag with this name already exists"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(matches!(
            duplicate_name(AppError::NotFound("Tag not found".into())),
            AppError::NotFound(_)
        ));
    }
}
