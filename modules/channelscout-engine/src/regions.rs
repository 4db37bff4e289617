//! Built-in geography: US states with their three largest cities, and the
//! topic categories every locality must resolve.

use channelscout_common::Geography;

pub const CATEGORIES: [&str; 3] = ["cinema", "gaming", "culture_entertainment"];

pub fn category_label(key: &str) -> &'static str {
    match key {
        "cinema" => "Cinema / Movie Reviews",
        "gaming" => "Gaming / Video Games",
        "culture_entertainment" => "Culture & Entertainment",
        _ => "Content Creation",
    }
}

/// Search terms seeding fallback queries per category.
pub fn category_terms(key: &str) -> &'static [&'static str] {
    match key {
        "cinema" => &[
            "movie review",
            "film review",
            "film critic",
            "cinema",
            "movie commentary",
            "film analysis",
        ],
        "gaming" => &[
            "gaming",
            "gamer",
            "gameplay",
            "let's play",
            "game review",
            "video game",
            "streamer",
        ],
        "culture_entertainment" => &[
            "vlog",
            "lifestyle",
            "culture",
            "entertainment",
            "comedy",
            "podcast",
            "pop culture",
        ],
        _ => &["content creator"],
    }
}

#[rustfmt::skip]
const US_STATES: &[(&str, [&str; 3])] = &[
    ("Alabama", ["Birmingham", "Montgomery", "Huntsville"]),
    ("Alaska", ["Anchorage", "Fairbanks", "Juneau"]),
    ("Arizona", ["Phoenix", "Tucson", "Mesa"]),
    ("Arkansas", ["Little Rock", "Fort Smith", "Fayetteville"]),
    ("California", ["Los Angeles", "San Diego", "San Jose"]),
    ("Colorado", ["Denver", "Colorado Springs", "Aurora"]),
    ("Connecticut", ["Bridgeport", "New Haven", "Hartford"]),
    ("Delaware", ["Wilmington", "Dover", "Newark"]),
    ("Florida", ["Jacksonville", "Miami", "Tampa"]),
    ("Georgia", ["Atlanta", "Augusta", "Columbus"]),
    ("Hawaii", ["Honolulu", "Pearl City", "Hilo"]),
    ("Idaho", ["Boise", "Meridian", "Nampa"]),
    ("Illinois", ["Chicago", "Aurora", "Joliet"]),
    ("Indiana", ["Indianapolis", "Fort Wayne", "Evansville"]),
    ("Iowa", ["Des Moines", "Cedar Rapids", "Davenport"]),
    ("Kansas", ["Wichita", "Overland Park", "Kansas City"]),
    ("Kentucky", ["Louisville", "Lexington", "Bowling Green"]),
    ("Louisiana", ["New Orleans", "Baton Rouge", "Shreveport"]),
    ("Maine", ["Portland", "Lewiston", "Bangor"]),
    ("Maryland", ["Baltimore", "Frederick", "Rockville"]),
    ("Massachusetts", ["Boston", "Worcester", "Springfield"]),
    ("Michigan", ["Detroit", "Grand Rapids", "Warren"]),
    ("Minnesota", ["Minneapolis", "Saint Paul", "Rochester"]),
    ("Mississippi", ["Jackson", "Gulfport", "Southaven"]),
    ("Missouri", ["Kansas City", "Saint Louis", "Springfield"]),
    ("Montana", ["Billings", "Missoula", "Great Falls"]),
    ("Nebraska", ["Omaha", "Lincoln", "Bellevue"]),
    ("Nevada", ["Las Vegas", "Henderson", "Reno"]),
    ("New Hampshire", ["Manchester", "Nashua", "Concord"]),
    ("New Jersey", ["Newark", "Jersey City", "Paterson"]),
    ("New Mexico", ["Albuquerque", "Las Cruces", "Rio Rancho"]),
    ("New York", ["New York City", "Buffalo", "Rochester"]),
    ("North Carolina", ["Charlotte", "Raleigh", "Greensboro"]),
    ("North Dakota", ["Fargo", "Bismarck", "Grand Forks"]),
    ("Ohio", ["Columbus", "Cleveland", "Cincinnati"]),
    ("Oklahoma", ["Oklahoma City", "Tulsa", "Norman"]),
    ("Oregon", ["Portland", "Salem", "Eugene"]),
    ("Pennsylvania", ["Philadelphia", "Pittsburgh", "Allentown"]),
    ("Rhode Island", ["Providence", "Warwick", "Cranston"]),
    ("South Carolina", ["Charleston", "Columbia", "North Charleston"]),
    ("South Dakota", ["Sioux Falls", "Rapid City", "Aberdeen"]),
    ("Tennessee", ["Nashville", "Memphis", "Knoxville"]),
    ("Texas", ["Houston", "San Antonio", "Dallas"]),
    ("Utah", ["Salt Lake City", "West Valley City", "Provo"]),
    ("Vermont", ["Burlington", "South Burlington", "Rutland"]),
    ("Virginia", ["Virginia Beach", "Norfolk", "Chesapeake"]),
    ("Washington", ["Seattle", "Spokane", "Tacoma"]),
    ("West Virginia", ["Charleston", "Huntington", "Morgantown"]),
    ("Wisconsin", ["Milwaukee", "Madison", "Green Bay"]),
    ("Wyoming", ["Cheyenne", "Casper", "Laramie"]),
];

/// The default run target: 50 states x 3 cities x 3 categories.
pub fn us_geography() -> Geography {
    us_geography_filtered(None)
}

/// Same as [`us_geography`] but optionally restricted to named regions.
pub fn us_geography_filtered(only: Option<&[String]>) -> Geography {
    let categories: Vec<String> = CATEGORIES.iter().map(|c| c.to_string()).collect();
    let regions = US_STATES
        .iter()
        .filter(|(name, _)| match only {
            Some(filter) => filter.iter().any(|f| f.eq_ignore_ascii_case(name)),
            None => true,
        })
        .map(|(name, cities)| {
            (
                name.to_string(),
                cities.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect();
    Geography::new(regions, &categories)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_geography_is_valid_and_complete() {
        let geography = us_geography();
        geography.validate().unwrap();
        assert_eq!(geography.regions.len(), 50);
        assert_eq!(geography.slot_count(), 50 * 3 * 3);
    }

    #[test]
    fn filter_is_case_insensitive() {
        let filter = vec!["oregon".to_string()];
        let geography = us_geography_filtered(Some(&filter));
        assert_eq!(geography.regions.len(), 1);
        assert_eq!(geography.regions[0].name, "Oregon");
    }
}
