// src/db.rs
use crate::guards::RecipeList;
use crate::models::{
    AuthoredRecipe, CartLine, Ingredient, IngredientCreate, RecipeFilter, RecipeIngredientRow,
    RecipeRow, RecipeTagRow, RecipeWrite, Tag, TagCreate, User,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, username, first_name, last_name, role, password_hash, created_at";

pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn get_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_users_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await
}

pub async fn create_user(pool: &PgPool, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO users (id, email, username, first_name, last_name, role, password_hash, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_password(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_users(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
}

pub async fn list_users(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

// Follows

pub async fn is_following(
    pool: &PgPool,
    user_id: Uuid,
    author_id: Uuid,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
    )
    .bind(user_id)
    .bind(author_id)
    .fetch_one(pool)
    .await
}

/// Which of `author_ids` the user follows.
pub async fn followed_among(
    pool: &PgPool,
    user_id: Uuid,
    author_ids: &[Uuid],
) -> Result<HashSet<Uuid>, sqlx::Error> {
    let rows: Vec<Uuid> = sqlx::query_scalar(
        "SELECT author_id FROM follows WHERE user_id = $1 AND author_id = ANY($2)",
    )
    .bind(user_id)
    .bind(author_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

pub async fn create_follow(
    pool: &PgPool,
    user_id: Uuid,
    author_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO follows (id, user_id, author_id) VALUES ($1, $2, $3)")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(author_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_follow(
    pool: &PgPool,
    user_id: Uuid,
    author_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(author_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_subscriptions(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn list_subscriptions(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.role, u.password_hash, u.created_at
         FROM users u
         INNER JOIN follows f ON f.author_id = u.id
         WHERE f.user_id = $1
         ORDER BY u.username, u.id
         LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Every recipe of the given authors, newest first.
pub async fn recipes_by_authors(
    pool: &PgPool,
    author_ids: &[Uuid],
) -> Result<Vec<AuthoredRecipe>, sqlx::Error> {
    sqlx::query_as::<_, AuthoredRecipe>(
        "SELECT author_id, id, name, image, cooking_time FROM recipes WHERE author_id = ANY($1) ORDER BY pub_date DESC",
    )
    .bind(author_ids)
    .fetch_all(pool)
    .await
}

// Tags

pub async fn list_tags(pool: &PgPool) -> Result<Vec<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>("SELECT id, name, slug, color FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
}

pub async fn get_tag(pool: &PgPool, id: Uuid) -> Result<Option<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>("SELECT id, name, slug, color FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create_tag(pool: &PgPool, tag: &TagCreate) -> Result<Tag, sqlx::Error> {
    sqlx::query_as::<_, Tag>(
        "INSERT INTO tags (id, name, slug, color) VALUES ($1, $2, $3, $4) RETURNING id, name, slug, color",
    )
    .bind(Uuid::new_v4())
    .bind(&tag.name)
    .bind(&tag.slug)
    .bind(&tag.color)
    .fetch_one(pool)
    .await
}

pub async fn count_existing_tags(pool: &PgPool, ids: &[Uuid]) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_one(pool)
        .await
}

// Ingredients

pub async fn list_ingredients(
    pool: &PgPool,
    name_prefix: Option<&str>,
) -> Result<Vec<Ingredient>, sqlx::Error> {
    match name_prefix {
        Some(prefix) => {
            sqlx::query_as::<_, Ingredient>(
                "SELECT id, name, measurement_unit FROM ingredients WHERE LOWER(name) LIKE $1 ESCAPE '\\' ORDER BY name",
            )
            .bind(like_prefix(prefix))
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Ingredient>(
                "SELECT id, name, measurement_unit FROM ingredients ORDER BY name",
            )
            .fetch_all(pool)
            .await
        }
    }
}

/// Lower-cased `LIKE` pattern matching names that start with `prefix`.
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn get_ingredient(pool: &PgPool, id: Uuid) -> Result<Option<Ingredient>, sqlx::Error> {
    sqlx::query_as::<_, Ingredient>(
        "SELECT id, name, measurement_unit FROM ingredients WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn create_ingredient(
    pool: &PgPool,
    ingredient: &IngredientCreate,
) -> Result<Ingredient, sqlx::Error> {
    sqlx::query_as::<_, Ingredient>(
        "INSERT INTO ingredients (id, name, measurement_unit) VALUES ($1, $2, $3) RETURNING id, name, measurement_unit",
    )
    .bind(Uuid::new_v4())
    .bind(&ingredient.name)
    .bind(&ingredient.measurement_unit)
    .fetch_one(pool)
    .await
}

pub async fn count_existing_ingredients(pool: &PgPool, ids: &[Uuid]) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM ingredients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_one(pool)
        .await
}

// Recipes

fn push_recipe_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &RecipeFilter, viewer: Option<Uuid>) {
    qb.push(" WHERE TRUE");
    if let Some(author_id) = filter.author {
        qb.push(" AND r.author_id = ").push_bind(author_id);
    }
    if !filter.tags.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(",
        )
        .push_bind(filter.tags.clone())
        .push("))");
    }
    // Membership filters only mean something for a signed-in caller.
    if let Some(user_id) = viewer {
        for (flag, list) in [
            (filter.is_favorited, RecipeList::Favourites),
            (filter.is_in_shopping_cart, RecipeList::Cart),
        ] {
            if let Some(wanted) = flag {
                qb.push(if wanted { " AND EXISTS" } else { " AND NOT EXISTS" })
                    .push(format!(
                        " (SELECT 1 FROM {} l WHERE l.recipe_id = r.id AND l.user_id = ",
                        list.table()
                    ))
                    .push_bind(user_id)
                    .push(")");
            }
        }
    }
}

pub async fn count_recipes(
    pool: &PgPool,
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM recipes r");
    push_recipe_filters(&mut qb, filter, viewer);
    let (count,) = qb.build_query_as::<(i64,)>().fetch_one(pool).await?;
    Ok(count)
}

pub async fn list_recipes(
    pool: &PgPool,
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Vec<RecipeRow>, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT r.id, r.name, r.cooking_time, r.text, r.image, r.author_id, r.pub_date FROM recipes r",
    );
    push_recipe_filters(&mut qb, filter, viewer);
    qb.push(" ORDER BY r.pub_date DESC, r.id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    qb.build_query_as::<RecipeRow>().fetch_all(pool).await
}

pub async fn get_recipe(pool: &PgPool, id: Uuid) -> Result<Option<RecipeRow>, sqlx::Error> {
    sqlx::query_as::<_, RecipeRow>(
        "SELECT id, name, cooking_time, text, image, author_id, pub_date FROM recipes WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn tags_for_recipes(
    pool: &PgPool,
    recipe_ids: &[Uuid],
) -> Result<Vec<RecipeTagRow>, sqlx::Error> {
    sqlx::query_as::<_, RecipeTagRow>(
        "SELECT rt.recipe_id, t.id, t.name, t.slug, t.color
         FROM recipe_tags rt
         INNER JOIN tags t ON t.id = rt.tag_id
         WHERE rt.recipe_id = ANY($1)
         ORDER BY t.name",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
}

pub async fn ingredients_for_recipes(
    pool: &PgPool,
    recipe_ids: &[Uuid],
) -> Result<Vec<RecipeIngredientRow>, sqlx::Error> {
    sqlx::query_as::<_, RecipeIngredientRow>(
        "SELECT ir.recipe_id, i.id, i.name, i.measurement_unit, ir.amount
         FROM ingredients_in_recipe ir
         INNER JOIN ingredients i ON i.id = ir.ingredient_id
         WHERE ir.recipe_id = ANY($1)
         ORDER BY i.name",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
}

pub async fn insert_recipe(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    author_id: Uuid,
    recipe: &RecipeWrite,
    image_key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO recipes (id, name, cooking_time, text, image, author_id, pub_date) VALUES ($1, $2, $3, $4, $5, $6, NOW())")
        .bind(recipe_id)
        .bind(&recipe.name)
        .bind(recipe.cooking_time)
        .bind(&recipe.text)
        .bind(image_key)
        .bind(author_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn update_recipe(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    recipe: &RecipeWrite,
    image_key: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE recipes SET name = $2, cooking_time = $3, text = $4, image = COALESCE($5, image) WHERE id = $1")
        .bind(recipe_id)
        .bind(&recipe.name)
        .bind(recipe.cooking_time)
        .bind(&recipe.text)
        .bind(image_key)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Replaces the tag and ingredient sets of a recipe wholesale.
pub async fn replace_recipe_relations(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    recipe: &RecipeWrite,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM ingredients_in_recipe WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;

    for tag_id in &recipe.tags {
        sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES ($1, $2)")
            .bind(recipe_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await?;
    }
    for item in &recipe.ingredients {
        sqlx::query("INSERT INTO ingredients_in_recipe (id, recipe_id, ingredient_id, amount) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(recipe_id)
            .bind(item.id)
            .bind(item.amount)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Deletes a recipe after every row that references it.
pub async fn delete_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    for table in ["recipe_tags", "ingredients_in_recipe", "favourites", "carts"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE recipe_id = $1"))
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
    }
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}

// Favourites and cart

pub async fn is_listed(
    pool: &PgPool,
    list: RecipeList,
    user_id: Uuid,
    recipe_id: Uuid,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2)",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_one(pool)
    .await
}

/// Which of `recipe_ids` the user has in `list`.
pub async fn listed_among(
    pool: &PgPool,
    list: RecipeList,
    user_id: Uuid,
    recipe_ids: &[Uuid],
) -> Result<HashSet<Uuid>, sqlx::Error> {
    let rows: Vec<Uuid> = sqlx::query_scalar(&format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = ANY($2)",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

pub async fn add_to_list(
    pool: &PgPool,
    list: RecipeList,
    user_id: Uuid,
    recipe_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO {} (id, user_id, recipe_id) VALUES ($1, $2, $3)",
        list.table()
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_from_list(
    pool: &PgPool,
    list: RecipeList,
    user_id: Uuid,
    recipe_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Every ingredient line of every recipe in the user's cart, ordered by
/// ingredient name under the database collation.
pub async fn cart_lines(pool: &PgPool, user_id: Uuid) -> Result<Vec<CartLine>, sqlx::Error> {
    sqlx::query_as::<_, CartLine>(
        "SELECT i.name, i.measurement_unit, ir.amount
         FROM carts c
         INNER JOIN ingredients_in_recipe ir ON ir.recipe_id = c.recipe_id
         INNER JOIN ingredients i ON i.id = ir.ingredient_id
         WHERE c.user_id = $1
         ORDER BY i.name, i.measurement_unit",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
