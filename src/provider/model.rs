use serde::Deserialize;

/// Envelope of the "last tweets" endpoint. Some deployments nest the list
/// under `data`, others return it at the top level.
#[derive(Deserialize, Debug)]
pub struct LastTweetsResp {
    pub status: Option<String>,
    #[serde(alias = "message")]
    pub msg: Option<String>,
    pub data: Option<TweetsData>,
    pub tweets: Option<Vec<WireTweet>>,
}

#[derive(Deserialize, Debug)]
pub struct TweetsData {
    #[serde(default)]
    pub tweets: Vec<WireTweet>,
}

#[derive(Deserialize, Debug)]
pub struct WireAuthor {
    #[serde(rename = "userName")]
    pub user_name: String,
    pub name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct WireTweet {
    pub id: String,
    pub text: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
    pub lang: Option<String>,
    pub author: Option<WireAuthor>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<i64>,
    #[serde(rename = "retweetCount")]
    pub retweet_count: Option<i64>,
    #[serde(rename = "replyCount")]
    pub reply_count: Option<i64>,
    #[serde(rename = "quoteCount")]
    pub quote_count: Option<i64>,
    #[serde(rename = "viewCount")]
    pub view_count: Option<i64>,
    pub quoted_tweet: Option<Box<WireTweet>>,
}
