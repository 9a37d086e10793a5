/// Key layout for catalog partitions
///
/// Partition structure:
/// - `subscriptions`: sub:{external_id} -> Subscription (JSON)
/// - `channels`: chan:{channel_id} -> ChannelInfo (JSON)
/// - `metadata`: meta:{key} -> value

/// Encode a subscription key: sub:{external_id}
pub fn encode_subscription_key(external_id: &str) -> Vec<u8> {
    format!("sub:{}", external_id).into_bytes()
}

/// Encode a channel key: chan:{channel_id}
pub fn encode_channel_key(channel_id: &str) -> Vec<u8> {
    format!("chan:{}", channel_id).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
