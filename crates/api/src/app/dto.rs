use chrono::{DateTime, Utc};
use serde::Deserialize;

use shipcheck_core::{AggregateId, DomainError, DomainResult};
use shipcheck_infra::OrderFilter;
use shipcheck_orders::{CreateOrder, Entry, OrderId, OrderStatus, PartNumber, TrackingId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct EntryRequest {
    #[serde(alias = "partNumberCount")]
    pub part_number_count: u32,
    #[serde(alias = "partNumbers")]
    pub part_numbers: Vec<String>,
}

/// Create-order body.
///
/// Either `entries`, or the older flat `part_number` + `quantity` pair.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(alias = "trackingId")]
    pub tracking_id: String,
    #[serde(alias = "customerName")]
    pub customer_name: String,
    pub platform: Option<String>,
    #[serde(default)]
    pub entries: Vec<EntryRequest>,
    #[serde(alias = "partNumber")]
    pub part_number: Option<String>,
    pub quantity: Option<u32>,
}

impl CreateOrderRequest {
    pub fn into_command(self, occurred_at: DateTime<Utc>) -> DomainResult<CreateOrder> {
        let tracking_id = TrackingId::parse(&self.tracking_id)?;

        let mut entries = Vec::with_capacity(self.entries.len().max(1));
        for e in self.entries {
            let part_numbers = e
                .part_numbers
                .iter()
                .map(|p| PartNumber::parse(p))
                .collect::<DomainResult<Vec<_>>>()?;
            entries.push(Entry {
                part_number_count: e.part_number_count,
                part_numbers,
            });
        }

        match (self.part_number, self.quantity) {
            (Some(part), quantity) if entries.is_empty() => {
                let part = PartNumber::parse(&part)?;
                let quantity = quantity.unwrap_or(1);
                entries.push(Entry::new(vec![part; quantity as usize]));
            }
            (Some(_), _) => {
                return Err(DomainError::validation(
                    "send either entries or part_number/quantity, not both",
                ));
            }
            (None, Some(_)) => {
                return Err(DomainError::validation("quantity requires part_number"));
            }
            (None, None) => {}
        }

        Ok(CreateOrder {
            order_id: OrderId::new(AggregateId::new()),
            tracking_id,
            customer_name: self.customer_name,
            platform: self.platform,
            entries,
            occurred_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub created_since: Option<String>,
}

impl ListOrdersQuery {
    pub fn into_filter(self) -> DomainResult<OrderFilter> {
        let status = self
            .status
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<OrderStatus>())
            .transpose()?;

        let created_since = self
            .created_since
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                DateTime::parse_from_rfc3339(s.trim())
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| {
                        DomainError::validation(format!("created_since must be RFC 3339: {e}"))
                    })
            })
            .transpose()?;

        Ok(OrderFilter {
            status,
            created_since,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BeginScanRequest {
    #[serde(alias = "trackingId")]
    pub tracking_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanPartRequest {
    #[serde(alias = "partNumber", alias = "partId")]
    pub part_number: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_entries_become_a_command() {
        let req: CreateOrderRequest = serde_json::from_value(json!({
            "trackingId": " TRK-1 ",
            "customerName": "Acme",
            "entries": [{"partNumberCount": 2, "partNumbers": ["A1", "A1"]}]
        }))
        .unwrap();
        let cmd = req.into_command(Utc::now()).unwrap();
        assert_eq!(cmd.tracking_id.as_str(), "TRK-1");
        assert_eq!(cmd.entries[0].part_numbers.len(), 2);
    }

    #[test]
    fn legacy_flat_body_expands_quantity() {
        let req: CreateOrderRequest = serde_json::from_value(json!({
            "trackingId": "TRK-2",
            "customerName": "Acme",
            "partNumber": "B7",
            "quantity": 3
        }))
        .unwrap();
        let cmd = req.into_command(Utc::now()).unwrap();
        assert_eq!(cmd.entries.len(), 1);
        assert_eq!(cmd.entries[0].part_number_count, 3);
        assert!(cmd.entries[0].is_consistent());
    }

    #[test]
    fn blank_identifiers_are_validation_errors() {
        let req: CreateOrderRequest = serde_json::from_value(json!({
            "trackingId": "  ",
            "customerName": "Acme",
            "entries": []
        }))
        .unwrap();
        assert!(matches!(req.into_command(Utc::now()), Err(DomainError::Validation(_))));
    }

    #[test]
    fn list_query_parses_status_and_date() {
        let filter = ListOrdersQuery {
            status: Some("Dispatched".to_string()),
            created_since: Some("2024-05-01T00:00:00Z".to_string()),
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.status, Some(OrderStatus::Dispatched));
        assert!(filter.created_since.is_some());

        assert!(ListOrdersQuery {
            status: None,
            created_since: Some("yesterday".to_string()),
        }
        .into_filter()
        .is_err());
    }
}
