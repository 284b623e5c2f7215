use crate::{
    entities::{cart_item, CartItem, CartLine},
    errors::ServiceError,
    events::{Event, EventSender},
    services::coupons::{CartLineSource, PreviewStore},
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Course cart service.
///
/// The `CartService` owns the per-user cart rows the coupon engine reads:
/// - Adding a course (one line per course; adding it again is a no-op)
/// - Bulk adds from a wishlist or bundle
/// - Removing a course and emptying the cart
///
/// Every mutation drops the user's cached totals. Removing a line also drops
/// the coupon preview when that line was one the coupon discounted.
///
/// # Examples
///
/// ```ignore
/// use coursemart_api::services::commerce::{AddCartItemInput, CartService};
///
/// let cart_service = CartService::new(db, previews, event_sender);
///
/// let line = cart_service.add_item(user_id, AddCartItemInput {
///     course_id,
///     category_id: Some(category_id),
///     instructor_id: Some(instructor_id),
///     price: dec!(49.99),
/// }).await?;
/// ```
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    previews: PreviewStore,
    event_sender: Arc<EventSender>,
}

impl CartService {
    /// Creates a new `CartService` instance.
    ///
    /// # Arguments
    ///
    /// * `db` - Database connection pool
    /// * `previews` - Cached coupon previews and totals to drop on mutation
    /// * `event_sender` - Event sender for publishing cart events
    pub fn new(
        db: Arc<DatabaseConnection>,
        previews: PreviewStore,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            previews,
            event_sender,
        }
    }

    /// Adds a course to the user's cart.
    ///
    /// The price, category and instructor are snapshotted onto the line so
    /// later catalog changes never move a cart total under the buyer.
    /// Publishes a `CartItemAdded` event when a line is created.
    ///
    /// # Returns
    ///
    /// * `Ok(CartLine)` - The new line, or the existing one if the course was already in the cart
    /// * `Err(ServiceError::ValidationError)` - Negative price
    /// * `Err(ServiceError)` - Database error
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddCartItemInput,
    ) -> Result<CartLine, ServiceError> {
        input.validate()?;

        if let Some(existing) = find_line(&*self.db, user_id, input.course_id).await? {
            return Ok(existing);
        }

        let line = match insert_line(&*self.db, user_id, &input).await? {
            Inserted::New(line) => line,
            // Lost a race with a concurrent add of the same course.
            Inserted::Duplicate => {
                return find_line(&*self.db, user_id, input.course_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "Cart line for course {} vanished after a duplicate insert",
                            input.course_id
                        ))
                    });
            }
        };

        self.previews.lines_added(user_id).await;
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                course_id: line.course_id,
            })
            .await;

        info!("Added course {} to cart of user {}", line.course_id, user_id);
        Ok(line)
    }

    /// Adds several courses in one transaction.
    ///
    /// Courses already in the cart, and repeats within the batch, are skipped.
    /// Either every new line is written or none is.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<CartLine>)` - Only the lines this call created
    /// * `Err(ServiceError::ValidationError)` - Any input fails validation
    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn add_items(
        &self,
        user_id: Uuid,
        inputs: Vec<AddCartItemInput>,
    ) -> Result<Vec<CartLine>, ServiceError> {
        for input in &inputs {
            input.validate()?;
        }

        let txn = self.db.begin().await?;

        let mut seen: HashSet<Uuid> = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|line| line.course_id)
            .collect();

        let mut added = Vec::new();
        for input in &inputs {
            if !seen.insert(input.course_id) {
                continue;
            }
            match insert_line(&txn, user_id, input).await? {
                Inserted::New(line) => added.push(line),
                Inserted::Duplicate => {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Course {} was added to the cart concurrently",
                        input.course_id
                    )));
                }
            }
        }

        txn.commit().await?;

        if !added.is_empty() {
            self.previews.lines_added(user_id).await;
        }
        for line in &added {
            self.event_sender
                .send_or_log(Event::CartItemAdded {
                    user_id,
                    course_id: line.course_id,
                })
                .await;
        }

        info!("Added {} courses to cart of user {}", added.len(), user_id);
        Ok(added)
    }

    /// Removes a course from the user's cart.
    ///
    /// Publishes a `CartItemRemoved` event when a line was removed.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The line existed and was removed
    /// * `Ok(false)` - The course was not in the cart
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, course_id: Uuid) -> Result<bool, ServiceError> {
        let Some(line) = find_line(&*self.db, user_id, course_id).await? else {
            return Ok(false);
        };

        let result = CartItem::delete_by_id(line.id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Ok(false);
        }

        self.previews.lines_removed(user_id, &[line.id]).await;
        self.event_sender
            .send_or_log(Event::CartItemRemoved { user_id, course_id })
            .await;

        info!("Removed course {} from cart of user {}", course_id, user_id);
        Ok(true)
    }

    /// Empties the user's cart and drops any applied coupon.
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - Number of lines removed
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        self.previews.cart_cleared(user_id).await;
        self.event_sender
            .send_or_log(Event::CartCleared(user_id))
            .await;

        info!("Cleared {} lines from cart of user {}", result.rows_affected, user_id);
        Ok(result.rows_affected)
    }

    /// Lines in the user's cart, oldest first.
    pub async fn lines_for_user(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        let lines = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::AddedAt)
            .order_by_asc(cart_item::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(lines)
    }
}

#[async_trait]
impl CartLineSource for CartService {
    async fn lines_for_user(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        CartService::lines_for_user(self, user_id).await
    }
}

enum Inserted {
    New(CartLine),
    Duplicate,
}

async fn find_line<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Option<CartLine>, ServiceError> {
    let line = CartItem::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .filter(cart_item::Column::CourseId.eq(course_id))
        .one(conn)
        .await?;
    Ok(line)
}

async fn insert_line<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    input: &AddCartItemInput,
) -> Result<Inserted, ServiceError> {
    let line = CartLine {
        id: Uuid::new_v4(),
        user_id,
        course_id: input.course_id,
        category_id: input.category_id,
        instructor_id: input.instructor_id,
        price_snapshot: input.price.round_dp(2),
        added_at: Utc::now(),
    };

    let active = cart_item::ActiveModel {
        id: Set(line.id),
        user_id: Set(line.user_id),
        course_id: Set(line.course_id),
        category_id: Set(line.category_id),
        instructor_id: Set(line.instructor_id),
        price_snapshot: Set(line.price_snapshot),
        added_at: Set(line.added_at),
    };

    match CartItem::insert(active).exec(conn).await {
        Ok(_) => Ok(Inserted::New(line)),
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Ok(Inserted::Duplicate),
            _ => Err(err.into()),
        },
    }
}

/// Input for adding a course to a cart
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddCartItemInput {
    pub course_id: Uuid,
    pub category_id: Option<Uuid>,
    pub instructor_id: Option<Uuid>,
    /// Current course price
    #[validate(custom = "validate_price")]
    pub price: Decimal,
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        let mut err = ValidationError::new("price");
        err.message = Some("Price must not be negative".into());
        return Err(err);
    }
    Ok(())
}
